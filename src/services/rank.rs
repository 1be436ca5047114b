//! Maps cumulative experience onto a rank tier.

use serde::Serialize;

/// Badge styling tier used by clients when rendering a rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualTier {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
    Legend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub visual_tier: VisualTier,
}

/// Ascending experience thresholds; the first entry must start at 0.
const RANKS: &[(u64, RankInfo)] = &[
    (
        0,
        RankInfo {
            name: "Novice",
            description: "Just getting started",
            visual_tier: VisualTier::Bronze,
        },
    ),
    (
        100,
        RankInfo {
            name: "Apprentice",
            description: "Knows the basics",
            visual_tier: VisualTier::Bronze,
        },
    ),
    (
        300,
        RankInfo {
            name: "Scholar",
            description: "A reliable answerer",
            visual_tier: VisualTier::Silver,
        },
    ),
    (
        700,
        RankInfo {
            name: "Expert",
            description: "Fast and accurate",
            visual_tier: VisualTier::Gold,
        },
    ),
    (
        1_500,
        RankInfo {
            name: "Master",
            description: "Rarely misses",
            visual_tier: VisualTier::Platinum,
        },
    ),
    (
        3_000,
        RankInfo {
            name: "Sage",
            description: "Knows almost everything",
            visual_tier: VisualTier::Diamond,
        },
    ),
    (
        6_000,
        RankInfo {
            name: "Legend",
            description: "Hall of fame",
            visual_tier: VisualTier::Legend,
        },
    ),
];

/// Highest tier whose threshold is at or below `experience`.
pub fn rank_for(experience: u64) -> RankInfo {
    RANKS
        .iter()
        .rev()
        .find(|(threshold, _)| *threshold <= experience)
        .map(|(_, rank)| *rank)
        .unwrap_or(RANKS[0].1)
}

/// Next tier above `experience` and the experience still missing to reach it.
pub fn next_rank(experience: u64) -> Option<(RankInfo, u64)> {
    RANKS
        .iter()
        .find(|(threshold, _)| *threshold > experience)
        .map(|(threshold, rank)| (*rank, threshold - experience))
}

/// New rank when going from `previous` to `current` experience crosses a threshold.
pub fn rank_up(previous: u64, current: u64) -> Option<RankInfo> {
    let before = rank_for(previous);
    let after = rank_for(current);
    (after.name != before.name && current > previous).then_some(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_inclusive() {
        assert_eq!(rank_for(0).name, "Novice");
        assert_eq!(rank_for(99).name, "Novice");
        assert_eq!(rank_for(100).name, "Apprentice");
        assert_eq!(rank_for(6_000).visual_tier, VisualTier::Legend);
        assert_eq!(rank_for(u64::MAX).name, "Legend");
    }

    #[test]
    fn table_is_strictly_ascending() {
        assert_eq!(RANKS[0].0, 0);
        assert!(RANKS.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn next_rank_reports_missing_experience() {
        let (next, missing) = next_rank(250).unwrap();
        assert_eq!(next.name, "Scholar");
        assert_eq!(missing, 50);
        assert!(next_rank(10_000).is_none());
    }

    #[test]
    fn rank_up_only_when_crossing_upwards() {
        assert_eq!(rank_up(90, 120).map(|rank| rank.name), Some("Apprentice"));
        assert!(rank_up(120, 150).is_none());
        assert!(rank_up(150, 90).is_none());
    }
}
