/// Default set size above which the bulk path is used.
pub const DEFAULT_BULK_THRESHOLD: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Direct,
    Bulk,
}

/// Chooses how to execute one create or update set.
///
/// An empty set is always direct (a no-op), even when bulk is forced.
#[must_use]
pub fn choose_path(set_len: usize, threshold: usize, force_bulk: bool) -> ExecutionPath {
    if set_len > threshold || (force_bulk && set_len > 0) {
        ExecutionPath::Bulk
    } else {
        ExecutionPath::Direct
    }
}
