use crate::error::PolicyError;

/// Slack subtracted before taking the ceiling, so products that land a rounding
/// error above an integer (`10 * 0.7`) do not demand an extra fragment.
const CEIL_EPSILON: f64 = 1e-9;

/// Decides when a frame buffer has enough fragments to ship.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CompletionPolicy {
    /// Every declared fragment must arrive.
    #[default]
    Exact,
    /// `ceil(total * fraction)` distinct fragments are enough.
    ///
    /// This is lossy: missing fragments become zero-length filler in the
    /// assembled frame.
    Threshold { fraction: f64 },
}

impl CompletionPolicy {
    /// Build a threshold policy. `fraction` must lie in `(0, 1]`; `1.0` behaves
    /// exactly like [`CompletionPolicy::Exact`].
    pub fn threshold(fraction: f64) -> Result<Self, PolicyError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(PolicyError::ThresholdOutOfRange(fraction));
        }
        Ok(CompletionPolicy::Threshold { fraction })
    }

    /// Number of distinct fragments needed before a frame of `total` fragments is ready.
    pub fn required(&self, total: u16) -> u16 {
        match *self {
            CompletionPolicy::Exact => total,
            CompletionPolicy::Threshold { fraction } => {
                let needed = (total as f64 * fraction - CEIL_EPSILON).ceil().max(1.0);
                // Never above the total, never zero for a non-empty frame.
                (needed as u16).min(total)
            }
        }
    }

    pub fn is_ready(&self, received: u16, total: u16) -> bool {
        total > 0 && received >= self.required(total)
    }

    /// The configured fraction (`1.0` for exact).
    pub fn fraction(&self) -> f64 {
        match *self {
            CompletionPolicy::Exact => 1.0,
            CompletionPolicy::Threshold { fraction } => fraction,
        }
    }

    /// True when completed frames may be missing fragments.
    pub fn is_lossy(&self) -> bool {
        self.fraction() < 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        let policy = CompletionPolicy::Exact;
        assert!(!policy.is_ready(9, 10));
        assert!(policy.is_ready(10, 10));
        assert!(!policy.is_lossy());
    }

    #[test]
    fn test_threshold_ninety_percent() {
        let policy = CompletionPolicy::threshold(0.9).unwrap();
        assert_eq!(policy.required(10), 9);
        assert!(!policy.is_ready(8, 10));
        assert!(policy.is_ready(9, 10));
        assert!(policy.is_lossy());
    }

    #[test]
    fn test_threshold_ceiling_is_exact() {
        // 10 * 0.7 in floating point is 7.000000000000001
        assert_eq!(CompletionPolicy::threshold(0.7).unwrap().required(10), 7);
        assert_eq!(CompletionPolicy::threshold(0.9).unwrap().required(11), 10);
        assert_eq!(CompletionPolicy::threshold(0.5).unwrap().required(3), 2);
    }

    #[test]
    fn test_fine_grained_threshold_not_rounded() {
        let policy = CompletionPolicy::threshold(0.99994).unwrap();
        assert_eq!(policy.required(60000), 59997);
        assert!(!policy.is_ready(59996, 60000));

        let policy = CompletionPolicy::threshold(0.99996).unwrap();
        assert_eq!(policy.required(60000), 59998);
        assert!(policy.is_lossy());

        assert_eq!(CompletionPolicy::threshold(0.33333).unwrap().required(3), 1);
        assert_eq!(CompletionPolicy::threshold(0.123456).unwrap().required(1000), 124);
    }

    #[test]
    fn test_full_threshold_matches_exact() {
        let policy = CompletionPolicy::threshold(1.0).unwrap();
        for total in 1..=64u16 {
            assert_eq!(policy.required(total), CompletionPolicy::Exact.required(total));
        }
        assert!(!policy.is_lossy());
    }

    #[test]
    fn test_tiny_threshold_needs_one_fragment() {
        let policy = CompletionPolicy::threshold(0.00001).unwrap();
        assert_eq!(policy.required(1000), 1);
        assert!(!policy.is_ready(0, 1000));
    }

    #[test]
    fn test_rejects_out_of_range() {
        for bad in [0.0, -0.5, 1.01, f64::NAN, f64::INFINITY] {
            assert!(CompletionPolicy::threshold(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn test_empty_frame_never_ready() {
        assert!(!CompletionPolicy::Exact.is_ready(0, 0));
    }
}
