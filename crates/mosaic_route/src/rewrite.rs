//! Token-splice SQL rewrite. Replacements happen at byte offsets the
//! parser recorded, never by searching the SQL text, so a table name
//! appearing inside a string literal is left alone.

use mosaic_common::{MosaicResult, RouteError};

use crate::context::SqlSpan;

/// One pending replacement: the span to cut and the text to splice in.
#[derive(Debug, Clone)]
pub struct Replacement {
    pub span: SqlSpan,
    pub text: String,
}

/// Apply all replacements to `sql` in one pass. Spans must lie inside the
/// text and must not overlap; both are parser contract violations reported
/// as `RouteError::TokenOutOfBounds`.
pub fn rewrite_sql(sql: &str, mut replacements: Vec<Replacement>) -> MosaicResult<String> {
    replacements.sort_by_key(|r| r.span.offset);

    let mut out = String::with_capacity(sql.len());
    let mut cursor = 0usize;
    for r in &replacements {
        let end = r.span.offset.saturating_add(r.span.len);
        if r.span.offset < cursor || end > sql.len() {
            return Err(RouteError::TokenOutOfBounds {
                offset: r.span.offset,
                len: r.span.len,
                sql_len: sql.len(),
            }
            .into());
        }
        out.push_str(&sql[cursor..r.span.offset]);
        out.push_str(&r.text);
        cursor = end;
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}
