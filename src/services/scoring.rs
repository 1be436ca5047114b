//! Converts a participant's end-of-game performance into experience.
//!
//! Raw correct-answer counts are not persisted; they are recovered by inverting the score
//! formula (`+correct_answer_score` per correct answer, `-penalty_magnitude` per miss).

use serde::{Deserialize, Serialize};

/// Point and experience constants. Loaded from config, defaulted otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringRules {
    pub correct_answer_score: i64,
    pub penalty_magnitude: i64,
    pub score_per_exp: i64,
    pub perfect_bonus: u64,
    pub solo_multiplier: f64,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            correct_answer_score: 10,
            penalty_magnitude: 5,
            score_per_exp: 10,
            perfect_bonus: 5,
            solo_multiplier: 0.5,
        }
    }
}

/// Local, end-of-game tally of one participant. Missing fields read as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPerformance {
    pub score: i64,
    pub miss_count: u32,
}

impl UserPerformance {
    pub fn record_correct(&mut self, rules: &ScoringRules) {
        self.score += rules.correct_answer_score;
    }

    pub fn record_miss(&mut self, rules: &ScoringRules) {
        self.score -= rules.penalty_magnitude;
        self.miss_count += 1;
    }
}

/// Experience earned by one participant for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceGain {
    pub exp_to_add: u64,
    /// Informational only.
    pub actual_correct_answers: u32,
    /// Informational only.
    pub is_solo_play: bool,
}

/// `floor((score + miss_count * penalty) / correct_answer_score)`, clamped at 0.
pub fn actual_correct_answers(score: i64, miss_count: u32, rules: &ScoringRules) -> u32 {
    if rules.correct_answer_score <= 0 {
        return 0;
    }
    let recovered = score + i64::from(miss_count) * rules.penalty_magnitude;
    let count = recovered.div_euclid(rules.correct_answer_score).max(0);
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// `floor(score / score_per_exp)` plus the perfect bonus for a flawless, non-empty game.
/// A negative score earns nothing.
pub fn base_experience(score: i64, miss_count: u32, rules: &ScoringRules) -> u64 {
    let from_score = if rules.score_per_exp > 0 {
        score.div_euclid(rules.score_per_exp).max(0) as u64
    } else {
        0
    };
    let bonus = if miss_count == 0 && score > 0 {
        rules.perfect_bonus
    } else {
        0
    };
    from_score + bonus
}

/// Apply the solo multiplier (rounded to nearest) when the participant played alone.
pub fn total_experience(
    performance: &UserPerformance,
    participant_count: usize,
    rules: &ScoringRules,
) -> ExperienceGain {
    let base = base_experience(performance.score, performance.miss_count, rules);
    let is_solo_play = participant_count == 1;
    let exp_to_add = if is_solo_play {
        (base as f64 * rules.solo_multiplier).round().max(0.0) as u64
    } else {
        base
    };

    ExperienceGain {
        exp_to_add,
        actual_correct_answers: actual_correct_answers(
            performance.score,
            performance.miss_count,
            rules,
        ),
        is_solo_play,
    }
}
