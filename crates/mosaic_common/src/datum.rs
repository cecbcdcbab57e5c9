use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single scalar value flowing through routing, execution, and merge.
/// Small enum, no heap allocation for fixed-size types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Datum {
    Null,
    Boolean(bool),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    Text(String),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
    /// Days since 1970-01-01.
    Date(i32),
    /// Fixed-point decimal: mantissa × 10^(-scale).
    /// e.g. Decimal(12345, 2) = 123.45
    Decimal(i128, u8),
}

impl Datum {
    pub fn is_null(&self) -> bool {
        matches!(self, Datum::Null)
    }

    /// Short kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Datum::Null => "null",
            Datum::Boolean(_) => "boolean",
            Datum::Int32(_) => "int32",
            Datum::Int64(_) => "int64",
            Datum::Float64(_) => "float64",
            Datum::Text(_) => "text",
            Datum::Timestamp(_) => "timestamp",
            Datum::Date(_) => "date",
            Datum::Decimal(_, _) => "decimal",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Datum::Int32(v) => Some(*v as i64),
            Datum::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Datum::Int32(v) => Some(*v as f64),
            Datum::Int64(v) => Some(*v as f64),
            Datum::Float64(v) => Some(*v),
            Datum::Decimal(m, s) => Some(*m as f64 / 10f64.powi(*s as i32)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Try to add two datums (SUM/COUNT partial merge). `Null` is the
    /// additive identity; incompatible kinds return `None`.
    pub fn add(&self, other: &Datum) -> Option<Datum> {
        match (self, other) {
            (Datum::Null, other) | (other, Datum::Null) => Some(other.clone()),
            (Datum::Int32(a), Datum::Int32(b)) => Some(Datum::Int64(*a as i64 + *b as i64)),
            (Datum::Int64(a), Datum::Int64(b)) => Some(Datum::Int64(a + b)),
            (Datum::Int64(a), Datum::Int32(b)) => Some(Datum::Int64(a + *b as i64)),
            (Datum::Int32(a), Datum::Int64(b)) => Some(Datum::Int64(*a as i64 + b)),
            (Datum::Float64(a), Datum::Float64(b)) => Some(Datum::Float64(a + b)),
            (Datum::Float64(a), Datum::Int64(b)) => Some(Datum::Float64(a + *b as f64)),
            (Datum::Float64(a), Datum::Int32(b)) => Some(Datum::Float64(a + *b as f64)),
            (Datum::Int64(a), Datum::Float64(b)) => Some(Datum::Float64(*a as f64 + b)),
            (Datum::Int32(a), Datum::Float64(b)) => Some(Datum::Float64(*a as f64 + b)),
            (Datum::Decimal(a, sa), Datum::Decimal(b, sb)) => Some(decimal_add(*a, *sa, *b, *sb)),
            (Datum::Decimal(a, sa), Datum::Int64(b)) => {
                Some(decimal_add(*a, *sa, *b as i128 * 10i128.pow(*sa as u32), *sa))
            }
            (Datum::Int64(a), Datum::Decimal(b, sb)) => {
                Some(decimal_add(*a as i128 * 10i128.pow(*sb as u32), *sb, *b, *sb))
            }
            _ => None,
        }
    }

    /// Create a Decimal from a string like "123.45" or "-0.001".
    pub fn parse_decimal(s: &str) -> Option<Datum> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        let (int_part, frac_part) = match s.find('.') {
            Some(dot) => (&s[..dot], &s[dot + 1..]),
            None => (s, ""),
        };
        let scale = frac_part.len() as u8;
        let mantissa: i128 = format!("{}{}", int_part, frac_part).parse().ok()?;
        Some(Datum::Decimal(mantissa, scale))
    }
}

impl fmt::Display for Datum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Null => write!(f, "NULL"),
            Datum::Boolean(b) => write!(f, "{}", b),
            Datum::Int32(v) => write!(f, "{}", v),
            Datum::Int64(v) => write!(f, "{}", v),
            Datum::Float64(v) => write!(f, "{}", v),
            Datum::Text(s) => write!(f, "{}", s),
            Datum::Timestamp(us) => {
                let secs = us / 1_000_000;
                let nsecs = ((us % 1_000_000) * 1000) as u32;
                match chrono::DateTime::from_timestamp(secs, nsecs) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
                    None => write!(f, "{}", us),
                }
            }
            Datum::Date(days) => {
                let epoch =
                    chrono::NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(chrono::NaiveDate::MIN);
                match epoch.checked_add_signed(chrono::Duration::days(*days as i64)) {
                    Some(d) => write!(f, "{}", d.format("%Y-%m-%d")),
                    None => write!(f, "{}", days),
                }
            }
            Datum::Decimal(m, s) => write!(f, "{}", decimal_to_string(*m, *s)),
        }
    }
}

impl PartialEq for Datum {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for Datum {
    /// Cross-type numeric comparison; `None` for NULL operands and for
    /// kind pairs with no SQL ordering (the merge layer decides what a
    /// NULL or incomparable pair means).
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Datum::Null, _) | (_, Datum::Null) => None,
            (Datum::Boolean(a), Datum::Boolean(b)) => a.partial_cmp(b),
            (Datum::Int32(a), Datum::Int32(b)) => a.partial_cmp(b),
            (Datum::Int64(a), Datum::Int64(b)) => a.partial_cmp(b),
            (Datum::Int32(a), Datum::Int64(b)) => (*a as i64).partial_cmp(b),
            (Datum::Int64(a), Datum::Int32(b)) => a.partial_cmp(&(*b as i64)),
            (Datum::Float64(a), Datum::Float64(b)) => a.partial_cmp(b),
            (Datum::Float64(a), Datum::Int32(b)) => a.partial_cmp(&(*b as f64)),
            (Datum::Float64(a), Datum::Int64(b)) => a.partial_cmp(&(*b as f64)),
            (Datum::Int32(a), Datum::Float64(b)) => (*a as f64).partial_cmp(b),
            (Datum::Int64(a), Datum::Float64(b)) => (*a as f64).partial_cmp(b),
            (Datum::Text(a), Datum::Text(b)) => a.partial_cmp(b),
            (Datum::Timestamp(a), Datum::Timestamp(b)) => a.partial_cmp(b),
            (Datum::Date(a), Datum::Date(b)) => a.partial_cmp(b),
            (Datum::Decimal(a, sa), Datum::Decimal(b, sb)) => {
                let (na, nb) = decimal_normalize(*a, *sa, *b, *sb);
                na.partial_cmp(&nb)
            }
            (Datum::Decimal(a, sa), Datum::Int64(b)) => {
                a.partial_cmp(&(*b as i128 * 10i128.pow(*sa as u32)))
            }
            (Datum::Int64(a), Datum::Decimal(b, sb)) => {
                (*a as i128 * 10i128.pow(*sb as u32)).partial_cmp(b)
            }
            (Datum::Decimal(a, sa), Datum::Float64(b)) => {
                (*a as f64 / 10f64.powi(*sa as i32)).partial_cmp(b)
            }
            (Datum::Float64(a), Datum::Decimal(b, sb)) => {
                a.partial_cmp(&(*b as f64 / 10f64.powi(*sb as i32)))
            }
            _ => None,
        }
    }
}

impl Hash for Datum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Explicit type tags (not mem::discriminant) so that cross-type
        // equality stays consistent: Int32(x) and Int64(x) hash the same.
        match self {
            Datum::Null => 0u8.hash(state),
            Datum::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Datum::Int32(v) => {
                2u8.hash(state);
                (*v as i64).hash(state);
            }
            Datum::Int64(v) => {
                2u8.hash(state);
                v.hash(state);
            }
            Datum::Float64(v) => {
                3u8.hash(state);
                v.to_bits().hash(state);
            }
            Datum::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
            Datum::Timestamp(us) => {
                5u8.hash(state);
                us.hash(state);
            }
            Datum::Date(days) => {
                6u8.hash(state);
                days.hash(state);
            }
            Datum::Decimal(m, s) => {
                7u8.hash(state);
                let (nm, ns) = decimal_trim(*m, *s);
                nm.hash(state);
                ns.hash(state);
            }
        }
    }
}

/// A row is an ordered list of datums.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedRow {
    pub values: Vec<Datum>,
}

impl OwnedRow {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Datum> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OwnedRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

// ── Decimal helpers ─────────────────────────────────────────────────────

/// Render a (mantissa, scale) decimal: (12345, 2) → "123.45".
pub fn decimal_to_string(mantissa: i128, scale: u8) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let negative = mantissa < 0;
    let digits = mantissa.unsigned_abs().to_string();
    let scale = scale as usize;
    let body = if digits.len() <= scale {
        format!("0.{}{}", "0".repeat(scale - digits.len()), digits)
    } else {
        let (int_part, frac_part) = digits.split_at(digits.len() - scale);
        format!("{}.{}", int_part, frac_part)
    };
    if negative {
        format!("-{}", body)
    } else {
        body
    }
}

fn decimal_normalize(a: i128, sa: u8, b: i128, sb: u8) -> (i128, i128) {
    match sa.cmp(&sb) {
        Ordering::Equal => (a, b),
        Ordering::Greater => (a, b * 10i128.pow((sa - sb) as u32)),
        Ordering::Less => (a * 10i128.pow((sb - sa) as u32), b),
    }
}

fn decimal_add(a: i128, sa: u8, b: i128, sb: u8) -> Datum {
    let (na, nb) = decimal_normalize(a, sa, b, sb);
    Datum::Decimal(na + nb, sa.max(sb))
}

/// Strip trailing zero fraction digits so equal decimals share one
/// canonical (mantissa, scale) form. Used by hashing and key encoding.
pub fn decimal_trim(mut mantissa: i128, mut scale: u8) -> (i128, u8) {
    if mantissa == 0 {
        return (0, 0);
    }
    while scale > 0 && mantissa % 10 == 0 {
        mantissa /= 10;
        scale -= 1;
    }
    (mantissa, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_type_ordering() {
        assert!(Datum::Int32(3) < Datum::Int64(4));
        assert!(Datum::Float64(2.5) < Datum::Int64(3));
        assert!(Datum::Decimal(100, 1) > Datum::Int64(9));
        assert_eq!(Datum::Int32(7), Datum::Int64(7));
        assert_eq!(Datum::Decimal(100, 1), Datum::Decimal(1000, 2));
    }

    #[test]
    fn null_is_not_comparable() {
        assert_eq!(Datum::Null.partial_cmp(&Datum::Int64(1)), None);
        assert_eq!(Datum::Null.partial_cmp(&Datum::Null), None);
        assert_ne!(Datum::Null, Datum::Null); // SQL NULL != NULL
    }

    #[test]
    fn add_treats_null_as_identity() {
        assert_eq!(Datum::Null.add(&Datum::Int64(5)), Some(Datum::Int64(5)));
        assert_eq!(Datum::Int64(2).add(&Datum::Int32(3)), Some(Datum::Int64(5)));
        assert_eq!(Datum::Text("x".into()).add(&Datum::Int64(1)), None);
    }

    #[test]
    fn decimal_parse_and_render() {
        assert_eq!(Datum::parse_decimal("123.45"), Some(Datum::Decimal(12345, 2)));
        assert_eq!(Datum::parse_decimal("-0.001"), Some(Datum::Decimal(-1, 3)));
        assert_eq!(decimal_to_string(12345, 2), "123.45");
        assert_eq!(decimal_to_string(-1, 3), "-0.001");
        assert_eq!(decimal_to_string(100, 0), "100");
    }

    #[test]
    fn decimal_add_mixed_scales() {
        let a = Datum::Decimal(100, 1); // 10.0
        let b = Datum::Decimal(5, 2); // 0.05
        assert_eq!(a.add(&b), Some(Datum::Decimal(1005, 2)));
    }

    #[test]
    fn hash_consistent_across_widths() {
        use std::collections::hash_map::DefaultHasher;
        fn h(d: &Datum) -> u64 {
            let mut hasher = DefaultHasher::new();
            d.hash(&mut hasher);
            hasher.finish()
        }
        assert_eq!(h(&Datum::Int32(42)), h(&Datum::Int64(42)));
        assert_eq!(h(&Datum::Decimal(100, 1)), h(&Datum::Decimal(1000, 2)));
    }
}
