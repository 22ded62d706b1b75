use serde::Serialize;

/// Success/failure counters accumulated across bulk batches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestTally {
    /// Documents the server accepted.
    pub succeeded: usize,
    /// Documents rejected individually or lost with a failed batch.
    pub failed: usize,
    /// Batches submitted.
    pub batches: usize,
}

impl IngestTally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a batch the server answered, with its per-item counts.
    pub fn record_batch(&mut self, succeeded: usize, failed: usize) {
        self.batches += 1;
        self.succeeded += succeeded;
        self.failed += failed;
    }

    /// Record a batch that failed as a whole.
    pub fn record_failed_batch(&mut self, size: usize) {
        self.batches += 1;
        self.failed += size;
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: IngestTally) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.batches += other.batches;
    }
}
