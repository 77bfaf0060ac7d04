//! Sample-counter tracking (§3: "monotonic modulo u32 wrap").

/// What happened between two consecutive observed sample numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The counter advanced by exactly one — no samples were missed.
    Contiguous,
    /// The counter advanced by more than one (accounting for wraparound);
    /// the field gives how many intervening samples were dropped.
    Gap {
        /// Count of samples that were never received.
        dropped: u32,
    },
    /// The counter decreased (not explained by wraparound): the device
    /// restarted its stream.
    StreamReset,
}

/// Tracks a stream's sample counter across `STREAM0` packets, detecting
/// gaps and resets.
#[derive(Debug, Clone, Copy)]
pub struct SampleCounter {
    last: Option<u32>,
}

impl SampleCounter {
    /// A tracker with no prior observation.
    #[must_use]
    pub fn new() -> Self {
        Self { last: None }
    }

    /// Record the next observed sample number and classify the advance.
    ///
    /// The first observation is always [`Advance::Contiguous`] — there's
    /// nothing to compare it against.
    pub fn observe(&mut self, sample_number: u32) -> Advance {
        let advance = match self.last {
            None => Advance::Contiguous,
            Some(last) => {
                let forward_distance = sample_number.wrapping_sub(last);
                // A forward_distance in the upper half of u32's range is far
                // more plausibly a backward jump (reset) than a ~2 billion
                // sample gap.
                if forward_distance == 0 {
                    Advance::StreamReset
                } else if forward_distance <= u32::MAX / 2 {
                    if forward_distance == 1 {
                        Advance::Contiguous
                    } else {
                        Advance::Gap { dropped: forward_distance - 1 }
                    }
                } else {
                    Advance::StreamReset
                }
            },
        };
        self.last = Some(sample_number);
        advance
    }

    /// The last observed sample number, if any.
    #[must_use]
    pub fn last(&self) -> Option<u32> {
        self.last
    }
}

impl Default for SampleCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_contiguous() {
        let mut counter = SampleCounter::new();
        assert_eq!(counter.observe(500), Advance::Contiguous);
    }

    #[test]
    fn sequential_numbers_are_contiguous() {
        let mut counter = SampleCounter::new();
        counter.observe(10);
        assert_eq!(counter.observe(11), Advance::Contiguous);
    }

    #[test]
    fn skipped_numbers_report_the_gap() {
        let mut counter = SampleCounter::new();
        counter.observe(10);
        assert_eq!(counter.observe(15), Advance::Gap { dropped: 4 });
    }

    #[test]
    fn wraparound_is_contiguous_not_a_reset() {
        let mut counter = SampleCounter::new();
        counter.observe(u32::MAX);
        assert_eq!(counter.observe(0), Advance::Contiguous);
    }

    #[test]
    fn wraparound_with_a_gap_is_still_a_gap() {
        let mut counter = SampleCounter::new();
        counter.observe(u32::MAX - 2);
        assert_eq!(counter.observe(1), Advance::Gap { dropped: 3 });
    }

    #[test]
    fn a_large_backward_jump_is_a_stream_reset() {
        let mut counter = SampleCounter::new();
        counter.observe(1_000_000);
        assert_eq!(counter.observe(5), Advance::StreamReset);
    }

    #[test]
    fn repeating_the_same_number_is_a_stream_reset() {
        let mut counter = SampleCounter::new();
        counter.observe(42);
        assert_eq!(counter.observe(42), Advance::StreamReset);
    }
}
