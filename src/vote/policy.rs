//! Quorum and plurality arithmetic.
//!
//! Pure functions over tallies and a configuration snapshot. Nothing here
//! touches a collaborator; the eligible-voter count for turnout is passed in.

use crate::config::ConfigDoc;

/// Typed view of the numeric settings of a vote configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub min_yes: u64,
    pub min_ballots: u64,
    /// Fraction of logged-in members that must take part (0 disables).
    pub turnout: f64,
    /// Fraction of ballots that must be yes.
    pub plurality: f64,
    /// Seconds the vote stays open.
    pub duration: u64,
    pub max_active: u64,
    pub max_per_user: u64,
    /// Yes count that closes the vote early (0 disables).
    pub intercede_yes: u64,
}

impl Policy {
    /// Read from a (merged) vote configuration. Unreadable values fall back
    /// to the built-in defaults.
    pub fn from_config(cfg: &ConfigDoc) -> Self {
        Self {
            min_yes: cfg.get_u64_or("min_yes", 1),
            min_ballots: cfg.get_u64_or("min_ballots", 1),
            turnout: cfg.get_f64_or("turnout", 0.0).clamp(0.0, 1.0),
            plurality: cfg.get_f64_or("plurality", 0.51).clamp(0.0, 1.0),
            duration: cfg.get_u64_or("duration", 30),
            max_active: cfg.get_u64_or("max_active", 16),
            max_per_user: cfg.get_u64_or("max_per_user", 1),
            intercede_yes: cfg.get_u64_or("intercede.yes", 0),
        }
    }

    pub fn plurality(&self, total: u64) -> u64 {
        plurality(total, self.plurality)
    }

    pub fn required(&self, total: u64) -> u64 {
        required(self.min_yes, total, self.plurality)
    }

    pub fn minimum(&self, eligible: u64) -> u64 {
        minimum(self.min_yes, self.min_ballots, self.turnout, eligible)
    }
}

/// `ceil(total * fraction)`
pub fn plurality(total: u64, fraction: f64) -> u64 {
    (total as f64 * fraction).ceil() as u64
}

/// Smallest yes count that passes: `max(min_yes, plurality)`.
pub fn required(min_yes: u64, total: u64, fraction: f64) -> u64 {
    min_yes.max(plurality(total, fraction))
}

/// Smallest ballot count for a valid result.
///
/// `max(min_yes, min_ballots)`, and when `turnout > 0` also
/// `ceil(eligible * turnout)`.
pub fn minimum(min_yes: u64, min_ballots: u64, turnout: f64, eligible: u64) -> u64 {
    let floor = min_yes.max(min_ballots);
    if turnout <= 0.0 {
        return floor;
    }
    floor.max((eligible as f64 * turnout).ceil() as u64)
}

/// True if `held` contains any flag character listed in `wanted`.
pub fn any_flag(held: &str, wanted: &str) -> bool {
    wanted.chars().any(|f| held.contains(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefaultConfig;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_policy() {
        let policy = Policy::from_config(&DefaultConfig::vote());
        assert_eq!(policy.min_yes, 1);
        assert_eq!(policy.min_ballots, 1);
        assert_eq!(policy.duration, 30);
        assert_eq!(policy.max_active, 16);
        assert_eq!(policy.max_per_user, 1);
        assert!((policy.plurality - 0.51).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unreadable_quotas_fall_back_to_defaults() {
        let mut cfg = ConfigDoc::new();
        cfg.put("max_active", "lots");
        cfg.put("max_per_user", serde_json::json!({"nested": 1}));

        let policy = Policy::from_config(&cfg);
        assert_eq!(policy.max_active, 16);
        assert_eq!(policy.max_per_user, 1);
    }

    #[test]
    fn test_single_yes_is_enough_with_defaults() {
        // initiator alone: total=1, yes=1
        assert_eq!(required(1, 1, 0.51), 1);
        assert_eq!(minimum(1, 1, 0.0, 500), 1);
    }

    #[test]
    fn test_split_vote_needs_two() {
        // 1 yes + 1 no: ceil(2 * 0.51) = 2
        assert_eq!(required(1, 2, 0.51), 2);
    }

    #[test]
    fn test_turnout() {
        assert_eq!(minimum(1, 1, 0.25, 10), 3);
        assert_eq!(minimum(5, 1, 0.25, 10), 5);
        assert_eq!(minimum(1, 1, 0.0, 10), 1);
    }

    #[test]
    fn test_any_flag() {
        assert!(any_flag("+ov", "o"));
        assert!(any_flag("v", "ov"));
        assert!(!any_flag("v", "o"));
        assert!(!any_flag("", "o"));
        assert!(!any_flag("ov", ""));
    }

    proptest! {
        /// Property: required() is max(min_yes, ceil(total * plurality))
        #[test]
        fn required_matches_formula(
            min_yes in 0u64..100,
            total in 0u64..10_000,
            fraction in 0.0f64..=1.0,
        ) {
            let expected = min_yes.max((total as f64 * fraction).ceil() as u64);
            prop_assert_eq!(required(min_yes, total, fraction), expected);
            prop_assert!(required(min_yes, total, fraction) >= min_yes);
        }

        /// Property: without a turnout requirement the channel size is irrelevant
        #[test]
        fn minimum_ignores_channel_without_turnout(
            min_yes in 0u64..100,
            min_ballots in 0u64..100,
            eligible_a in 0u64..10_000,
            eligible_b in 0u64..10_000,
        ) {
            let a = minimum(min_yes, min_ballots, 0.0, eligible_a);
            let b = minimum(min_yes, min_ballots, 0.0, eligible_b);
            prop_assert_eq!(a, b);
            prop_assert_eq!(a, min_yes.max(min_ballots));
        }

        /// Property: with a turnout requirement the minimum covers it
        #[test]
        fn minimum_reflects_turnout(
            min_yes in 0u64..100,
            min_ballots in 0u64..100,
            turnout in 0.01f64..=1.0,
            eligible in 0u64..10_000,
        ) {
            let m = minimum(min_yes, min_ballots, turnout, eligible);
            let by_turnout = (eligible as f64 * turnout).ceil() as u64;
            prop_assert_eq!(m, min_yes.max(min_ballots).max(by_turnout));
        }
    }
}
