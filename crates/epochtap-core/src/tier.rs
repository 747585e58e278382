//! Reward-efficiency tiers keyed by tapped-epoch count.
//!
//! Twelve contiguous inclusive ranges cover `1..=168`, ordered from most to
//! least efficient. Counts outside the table (0, or above the last upper
//! bound) have no tier and report as [`UNTIERED_NAME`].

use serde::Serialize;

/// Name reported when the count falls outside every range.
pub const UNTIERED_NAME: &str = "Inefficient";

/// One inclusive range of tapped-epoch counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tier {
    pub lower: u32,
    pub upper: u32,
    pub name: &'static str,
}

impl Tier {
    pub const fn new(lower: u32, upper: u32, name: &'static str) -> Self {
        Self { lower, upper, name }
    }

    pub fn contains(&self, tapped: u32) -> bool {
        self.lower <= tapped && tapped <= self.upper
    }
}

pub const TIERS: [Tier; 12] = [
    Tier::new(1, 14, "Extremely High"),
    Tier::new(15, 28, "Very High"),
    Tier::new(29, 42, "High"),
    Tier::new(43, 56, "Medium"),
    Tier::new(57, 70, "Medium–Low"),
    Tier::new(71, 84, "Inflection Zone"),
    Tier::new(85, 98, "Low"),
    Tier::new(99, 112, "Very Low"),
    Tier::new(113, 126, "Poor"),
    Tier::new(127, 140, "Near-Waste"),
    Tier::new(141, 154, "Almost Useless"),
    Tier::new(155, 168, "Effectively Zero"),
];

/// Result of a tier lookup. `tier` is `None` for the untiered sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierPlacement {
    pub tier: Option<Tier>,
}

impl TierPlacement {
    pub fn name(&self) -> &'static str {
        self.tier.map(|t| t.name).unwrap_or(UNTIERED_NAME)
    }

    pub fn bounds(&self) -> Option<(u32, u32)> {
        self.tier.map(|t| (t.lower, t.upper))
    }

    /// Epochs left before leaving the current tier; 0 when untiered.
    pub fn remaining_in_tier(&self, tapped: u32) -> u32 {
        self.tier
            .map(|t| t.upper.saturating_sub(tapped))
            .unwrap_or(0)
    }
}

/// Look up the tier enclosing `tapped`.
pub fn tier_for(tapped: u32) -> TierPlacement {
    // TIERS is sorted by `upper`; find the first range whose upper bound is
    // not below `tapped`, then check it actually encloses it.
    let idx = TIERS.partition_point(|t| t.upper < tapped);
    let tier = TIERS.get(idx).copied().filter(|t| t.contains(tapped));
    TierPlacement { tier }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_is_untiered() {
        let p = tier_for(0);
        assert_eq!(p.tier, None);
        assert_eq!(p.name(), "Inefficient");
        assert_eq!(p.remaining_in_tier(0), 0);
    }

    #[test]
    fn above_table_is_untiered() {
        let p = tier_for(169);
        assert_eq!(p.bounds(), None);
        assert_eq!(p.name(), UNTIERED_NAME);
        assert_eq!(p.remaining_in_tier(169), 0);
        assert_eq!(tier_for(u32::MAX).tier, None);
    }

    #[test]
    fn edges_of_each_range() {
        assert_eq!(tier_for(1).bounds(), Some((1, 14)));
        assert_eq!(tier_for(14).name(), "Extremely High");
        assert_eq!(tier_for(15).name(), "Very High");
        assert_eq!(tier_for(70).name(), "Medium–Low");
        assert_eq!(tier_for(71).name(), "Inflection Zone");
        assert_eq!(tier_for(168).name(), "Effectively Zero");
    }

    #[test]
    fn table_is_contiguous_and_ordered() {
        assert_eq!(TIERS[0].lower, 1);
        assert_eq!(TIERS[TIERS.len() - 1].upper, 168);
        for pair in TIERS.windows(2) {
            assert_eq!(pair[0].upper + 1, pair[1].lower);
        }
        for t in TIERS {
            assert!(t.lower <= t.upper);
        }
    }

    #[test]
    fn remaining_in_tier_counts_to_upper_bound() {
        assert_eq!(tier_for(1).remaining_in_tier(1), 13);
        assert_eq!(tier_for(14).remaining_in_tier(14), 0);
        assert_eq!(tier_for(100).remaining_in_tier(100), 12);
    }

    proptest! {
        #[test]
        fn every_tiered_count_has_exactly_one_enclosing_range(tapped in 1u32..=168) {
            let hits = TIERS.iter().filter(|t| t.contains(tapped)).count();
            prop_assert_eq!(hits, 1);
            let placement = tier_for(tapped);
            let tier = placement.tier.expect("count inside table");
            prop_assert!(tier.contains(tapped));
        }

        #[test]
        fn counts_past_table_never_have_a_tier(tapped in 169u32..) {
            prop_assert_eq!(tier_for(tapped).tier, None);
        }
    }
}
