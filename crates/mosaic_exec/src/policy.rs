//! Failure-aggregation policy. Passed explicitly per execution call —
//! never ambient thread-local state — so concurrent unrelated statements
//! can use different policies safely.

/// How multi-target failures are reported. Either way, every submitted
/// unit runs to completion (or its own failure) first, so resources are
/// always released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Report only the first failing unit, in route-plan order. Default.
    #[default]
    FailFast,
    /// Report a composite failure enumerating every failing unit.
    CollectAll,
}
