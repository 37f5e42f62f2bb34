/// Tally for one executed set (or one bulk batch).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Items the platform reports as handled.
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Human-readable failure reasons, one per failed item or batch.
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// Every one of `len` items failed for `reason`.
    #[must_use]
    pub fn all_failed(len: usize, reason: impl Into<String>) -> Self {
        Self {
            processed: 0,
            succeeded: 0,
            failed: len,
            errors: vec![reason.into()],
        }
    }

    pub fn merge(&mut self, other: BatchOutcome) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}
