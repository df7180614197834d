//! Batch progress accounting.
//!
//! The aggregator is the only writer of byte counters. Overall progress is
//! `completed_prior + position_in_current_file`, clamped to the batch
//! total. The reported value never decreases while a file is resumed; a
//! restart drops it back to the completed files, since the bytes of the
//! abandoned attempt no longer count.

/// Rounds `100 * done / total` up, capped at 100.
///
/// A zero `total` has nothing left to transfer and counts as 100%.
pub fn percent_ceil(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = u128::from(done.min(total));
    let total = u128::from(total);
    ((done * 100).div_ceil(total)) as u8
}

/// Byte counters for one upload run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressAggregator {
    total_size: u64,
    completed_prior: u64,
    current_size: u64,
    acknowledged: u64,
    position: u64,
    reported: u64,
}

impl ProgressAggregator {
    /// Starts a run over `total_size` bytes.
    pub fn new(total_size: u64) -> Self {
        Self {
            total_size,
            ..Default::default()
        }
    }

    /// Makes a file of `size` bytes the one in flight.
    pub fn begin_file(&mut self, size: u64) {
        self.current_size = size;
        self.acknowledged = 0;
        self.position = 0;
    }

    /// Falls back to the acknowledged offset before a resume; anything the
    /// transport reported past it was never committed.
    pub fn resume_file(&mut self) {
        self.position = self.acknowledged;
    }

    /// Records `bytes` newly committed bytes of the current file.
    pub fn acknowledge(&mut self, bytes: u64) {
        self.acknowledged = self
            .acknowledged
            .saturating_add(bytes)
            .min(self.current_size);
        self.position = self.position.max(self.acknowledged);
        self.publish();
    }

    /// Records a transport tick at `position` within the current file.
    pub fn observe(&mut self, position: u64) {
        self.position = position.min(self.current_size).max(self.acknowledged);
        self.publish();
    }

    /// Moves the position to the end of the current file once the agent has
    /// confirmed it, whether or not a final tick arrived.
    pub fn settle_file(&mut self) {
        self.acknowledged = self.current_size;
        self.position = self.current_size;
        self.publish();
    }

    /// Folds the current file into the completed total.
    pub fn complete_file(&mut self) {
        self.completed_prior = self.completed_prior.saturating_add(self.current_size);
        self.current_size = 0;
        self.acknowledged = 0;
        self.position = 0;
        self.publish();
    }

    /// Drops whatever the current file had counted, for a clean restart.
    pub fn discard_file(&mut self) {
        self.acknowledged = 0;
        self.position = 0;
    }

    /// Forgets the current file's attempt entirely, including what it had
    /// already pushed into the reported total.
    pub fn restart_file(&mut self) {
        self.discard_file();
        self.reported = self.completed_prior.min(self.total_size);
    }

    /// Bytes of the whole batch.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Sum of the sizes of files already finished.
    pub fn completed_prior(&self) -> u64 {
        self.completed_prior
    }

    /// Committed bytes of the current file.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged
    }

    /// Position within the current file, including transport ticks.
    pub fn file_bytes(&self) -> u64 {
        self.position
    }

    pub fn file_percent(&self) -> u8 {
        percent_ceil(self.position, self.current_size)
    }

    /// Overall bytes as last reported; never decreases within a run.
    pub fn overall_bytes(&self) -> u64 {
        self.reported
    }

    pub fn overall_percent(&self) -> u8 {
        percent_ceil(self.reported, self.total_size)
    }

    fn publish(&mut self) {
        let current = self
            .completed_prior
            .saturating_add(self.position)
            .min(self.total_size);
        self.reported = self.reported.max(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_up() {
        assert_eq!(percent_ceil(0, 150), 0);
        assert_eq!(percent_ceil(1, 150), 1);
        assert_eq!(percent_ceil(75, 150), 50);
        assert_eq!(percent_ceil(149, 150), 100);
        assert_eq!(percent_ceil(150, 150), 100);
        assert_eq!(percent_ceil(u64::MAX, u64::MAX), 100);
    }

    #[test]
    fn zero_total_never_divides() {
        assert_eq!(percent_ceil(0, 0), 100);
        let agg = ProgressAggregator::new(0);
        assert_eq!(agg.overall_percent(), 100);
    }

    #[test]
    fn overall_spans_files() {
        let mut agg = ProgressAggregator::new(150);
        agg.begin_file(100);
        agg.acknowledge(60);
        assert_eq!(agg.overall_bytes(), 60);
        agg.acknowledge(40);
        agg.complete_file();
        assert_eq!(agg.completed_prior(), 100);

        agg.begin_file(50);
        agg.observe(25);
        assert_eq!(agg.file_bytes(), 25);
        assert_eq!(agg.file_percent(), 50);
        assert_eq!(agg.overall_bytes(), 125);
        agg.acknowledge(50);
        agg.complete_file();
        assert_eq!(agg.overall_bytes(), 150);
        assert_eq!(agg.overall_percent(), 100);
    }

    #[test]
    fn ticks_never_undercut_acknowledged_bytes() {
        let mut agg = ProgressAggregator::new(100);
        agg.begin_file(100);
        agg.acknowledge(40);
        agg.observe(10);
        assert_eq!(agg.file_bytes(), 40);
        assert_eq!(agg.overall_bytes(), 40);
    }

    #[test]
    fn resume_keeps_reported_progress() {
        let mut agg = ProgressAggregator::new(100);
        agg.begin_file(100);
        agg.acknowledge(40);
        agg.observe(55);
        assert_eq!(agg.overall_bytes(), 55);

        agg.resume_file();
        assert_eq!(agg.file_bytes(), 40);
        assert_eq!(agg.overall_bytes(), 55);

        agg.observe(45);
        assert_eq!(agg.overall_bytes(), 55);
        agg.acknowledge(60);
        assert_eq!(agg.acknowledged(), 100);
        assert_eq!(agg.overall_bytes(), 100);
    }

    #[test]
    fn acknowledgements_are_clamped_to_file() {
        let mut agg = ProgressAggregator::new(30);
        agg.begin_file(10);
        agg.acknowledge(25);
        assert_eq!(agg.acknowledged(), 10);
        assert_eq!(agg.overall_bytes(), 10);
    }

    #[test]
    fn restart_forgets_abandoned_attempt() {
        let mut agg = ProgressAggregator::new(150);
        agg.begin_file(50);
        agg.acknowledge(50);
        agg.complete_file();

        agg.begin_file(100);
        agg.acknowledge(60);
        assert_eq!(agg.overall_bytes(), 110);

        agg.restart_file();
        assert_eq!(agg.file_bytes(), 0);
        assert_eq!(agg.overall_bytes(), 50);
        assert_eq!(agg.overall_percent(), 34);

        agg.observe(10);
        assert_eq!(agg.overall_bytes(), 60);
        assert_eq!(agg.overall_bytes(), agg.completed_prior() + agg.file_bytes());
    }

    #[test]
    fn settle_fills_file_without_final_tick() {
        let mut agg = ProgressAggregator::new(100);
        agg.begin_file(100);
        agg.observe(40);
        agg.settle_file();
        assert_eq!(agg.file_bytes(), 100);
        assert_eq!(agg.file_percent(), 100);
        assert_eq!(agg.overall_percent(), 100);

        let mut empty = ProgressAggregator::new(0);
        empty.begin_file(0);
        empty.settle_file();
        assert_eq!(empty.file_percent(), 100);
        assert_eq!(empty.overall_percent(), 100);
    }

    #[test]
    fn discard_drops_current_file_bytes() {
        let mut agg = ProgressAggregator::new(10);
        agg.begin_file(10);
        agg.discard_file();
        agg.begin_file(10);
        agg.acknowledge(10);
        agg.complete_file();
        assert_eq!(agg.completed_prior(), 10);
        assert_eq!(agg.overall_bytes(), 10);
    }
}
