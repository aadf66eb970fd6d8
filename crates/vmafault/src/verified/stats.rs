//! Running aggregate of one counter's per-cycle deltas.

/// Last, total, minimum and maximum of the values read so far.
///
/// Before any read `min` is `u64::MAX` and `max`/`total` are zero.
/// After at least one [`record`](Self::record), `min <= last <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStatistics {
    pub last: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
}

impl Default for EventStatistics {
    fn default() -> Self {
        Self {
            last: 0,
            total: 0,
            min: u64::MAX,
            max: 0,
        }
    }
}

impl EventStatistics {
    /// Fold one counter delta into the aggregate.
    pub fn record(&mut self, value: u64) {
        self.last = value;
        self.total = self.total.saturating_add(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        debug_assert!(self.min <= self.last && self.last <= self.max);
    }

    /// Integer mean over `cycles`, zero when no cycle ran.
    pub fn average(&self, cycles: u64) -> u64 {
        self.total.checked_div(cycles).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_statistics() {
        let s = EventStatistics::default();
        assert_eq!(s.min, u64::MAX);
        assert_eq!(s.max, 0);
        assert_eq!(s.total, 0);
    }

    #[test]
    fn aggregates_reads() {
        let mut s = EventStatistics::default();
        for v in [5, 2, 9] {
            s.record(v);
        }
        assert_eq!(s.total, 16);
        assert_eq!(s.min, 2);
        assert_eq!(s.max, 9);
        assert_eq!(s.last, 9);
        assert_eq!(s.average(3), 5);
    }

    #[test]
    fn single_zero_read() {
        let mut s = EventStatistics::default();
        s.record(0);
        assert_eq!((s.min, s.last, s.max), (0, 0, 0));
    }

    #[test]
    fn average_of_no_cycles_is_zero() {
        assert_eq!(EventStatistics::default().average(0), 0);
    }

    #[test]
    fn total_saturates() {
        let mut s = EventStatistics::default();
        s.record(u64::MAX);
        s.record(1);
        assert_eq!(s.total, u64::MAX);
    }
}
