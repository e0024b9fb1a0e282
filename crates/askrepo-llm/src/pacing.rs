//! Pacing between successive embedding calls.

use std::time::Duration;

/// How a gateway spaces out the requests of one `embed` call.
///
/// Texts are sent one request at a time in groups of `max_batch_size`.
/// `call_delay` separates requests inside a group, `batch_delay` separates groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    pub max_batch_size: usize,
    pub call_delay: Duration,
    pub batch_delay: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 16,
            call_delay: Duration::from_millis(25),
            batch_delay: Duration::from_millis(200),
        }
    }
}

impl PacingPolicy {
    /// A policy with no delays, for tests and local fakes.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            max_batch_size: usize::MAX,
            call_delay: Duration::ZERO,
            batch_delay: Duration::ZERO,
        }
    }

    /// Delay to wait before sending the request for the text at `index`.
    #[must_use]
    pub fn delay_before(&self, index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        if index % self.max_batch_size.max(1) == 0 {
            self.batch_delay
        } else {
            self.call_delay
        }
    }

    /// Number of groups needed for `len` texts.
    #[must_use]
    pub fn batch_count(&self, len: usize) -> usize {
        len.div_ceil(self.max_batch_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(batch: usize) -> PacingPolicy {
        PacingPolicy {
            max_batch_size: batch,
            call_delay: Duration::from_millis(5),
            batch_delay: Duration::from_millis(100),
        }
    }

    #[test]
    fn first_call_never_waits() {
        assert_eq!(policy(4).delay_before(0), Duration::ZERO);
    }

    #[test]
    fn batch_boundaries_use_batch_delay() {
        let p = policy(3);
        let delays: Vec<u64> = (0..7)
            .map(|i| u64::try_from(p.delay_before(i).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![0, 5, 5, 100, 5, 5, 100]);
    }

    #[test]
    fn zero_batch_size_is_treated_as_one() {
        let p = policy(0);
        assert_eq!(p.delay_before(1), Duration::from_millis(100));
        assert_eq!(p.batch_count(3), 3);
    }

    #[test]
    fn immediate_has_no_delays() {
        let p = PacingPolicy::immediate();
        assert!((0..50).all(|i| p.delay_before(i).is_zero()));
        assert_eq!(p.batch_count(10), 1);
    }

    proptest! {
        #[test]
        fn batch_delays_match_batch_count(len in 1usize..500, batch in 1usize..40) {
            let p = policy(batch);
            let boundaries = (0..len)
                .filter(|&i| p.delay_before(i) == p.batch_delay)
                .count();
            prop_assert_eq!(boundaries + 1, p.batch_count(len));
        }
    }
}
