// src/rl/reward.rs
use serde::{Deserialize, Serialize};

use crate::models::intervention::Intervention;
use crate::models::state::{BucketConfig, StudentState};

/// Weights of the scalar reward. Kept as configuration so policy experiments
/// can vary the shaping without code changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    /// Per mastery bucket gained.
    pub mastery: f64,
    /// Scales `1 - style fit` as a penalty.
    pub misalignment: f64,
    /// Per bucket of reduction in the spread between strongest and weakest pillar.
    pub balance: f64,
    /// Scales the intensity's effort cost as a penalty.
    pub effort: f64,
    /// Bonus on the step where every pillar reaches the top bucket.
    pub goal: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            mastery: 1.0,
            misalignment: 0.3,
            balance: 0.2,
            effort: 0.05,
            goal: 1.0,
        }
    }
}

/// Individual reward terms, already weighted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub mastery: f64,
    pub misalignment: f64,
    pub balance: f64,
    pub effort: f64,
    pub goal: f64,
}

impl RewardBreakdown {
    pub fn total(&self) -> f64 {
        self.mastery - self.misalignment + self.balance - self.effort + self.goal
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardModel {
    pub weights: RewardWeights,
    pub buckets: BucketConfig,
}

impl RewardModel {
    pub fn new(weights: RewardWeights, buckets: BucketConfig) -> Self {
        Self { weights, buckets }
    }

    /// Scores the move from `before` to `after` caused by `intervention`.
    pub fn score(
        &self,
        before: &StudentState,
        intervention: &Intervention,
        after: &StudentState,
    ) -> RewardBreakdown {
        let w = &self.weights;
        let mastery_delta = after.total_mastery() as f64 - before.total_mastery() as f64;
        let fit = intervention.strategy.fit(before.style);
        let spread_change = before.mastery_spread() as f64 - after.mastery_spread() as f64;
        let goal_reached =
            !before.all_mastered(&self.buckets) && after.all_mastered(&self.buckets);

        RewardBreakdown {
            mastery: w.mastery * mastery_delta,
            misalignment: w.misalignment * (1.0 - fit),
            balance: w.balance * spread_change,
            effort: w.effort * intervention.intensity.effort(),
            goal: if goal_reached { w.goal } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intervention::{Intensity, Strategy};
    use crate::models::skill::Skill;
    use crate::models::student_profile::KolbStyle;

    fn state(mastery: [u8; 4]) -> StudentState {
        StudentState {
            motivation: 1,
            self_efficacy: 1,
            aptitude: 1,
            style: KolbStyle::Convergent,
            mastery,
        }
    }

    fn intervention(strategy: Strategy, skill: Skill) -> Intervention {
        Intervention {
            id: 0,
            strategy,
            skill,
            intensity: Intensity::Standard,
        }
    }

    fn model(weights: RewardWeights) -> RewardModel {
        RewardModel::new(weights, BucketConfig::default())
    }

    #[test]
    fn test_aligned_balanced_progress_scores_higher_than_misaligned() {
        let before = state([0, 2, 2, 2]);
        let after = before.with_mastery(Skill::Literacy, 1);
        for weights in [
            RewardWeights::default(),
            RewardWeights { misalignment: 0.8, balance: 0.5, ..RewardWeights::default() },
            RewardWeights { mastery: 2.0, misalignment: 0.1, ..RewardWeights::default() },
        ] {
            let model = model(weights);
            let aligned = model.score(&before, &intervention(Strategy::ProblemBased, Skill::Literacy), &after);
            let misaligned = model.score(&before, &intervention(Strategy::InquiryBased, Skill::Literacy), &after);
            assert!(aligned.total() > misaligned.total());
            assert_eq!(aligned.misalignment, 0.0);
            assert!((misaligned.misalignment - weights.misalignment).abs() < 1e-12);
        }
    }

    #[test]
    fn test_widening_the_spread_is_penalized() {
        let before = state([2, 2, 2, 2]);
        let after = before.with_mastery(Skill::Numeracy, 3);
        let breakdown = model(RewardWeights::default()).score(
            &before,
            &intervention(Strategy::Scaffolding, Skill::Numeracy),
            &after,
        );
        assert!(breakdown.balance < 0.0);
        assert_eq!(breakdown.mastery, 1.0);
    }

    #[test]
    fn test_goal_bonus_only_on_completion_step() {
        let before = state([4, 4, 4, 3]);
        let after = before.with_mastery(Skill::Citizenship, 4);
        let model = model(RewardWeights::default());
        let action = intervention(Strategy::ProblemBased, Skill::Citizenship);
        assert_eq!(model.score(&before, &action, &after).goal, 1.0);
        assert_eq!(model.score(&after, &action, &after).goal, 0.0);
    }

    #[test]
    fn test_no_progress_costs_only_penalties() {
        let before = state([1, 1, 1, 1]);
        let breakdown = model(RewardWeights::default()).score(
            &before,
            &intervention(Strategy::ProblemBased, Skill::Digital),
            &before,
        );
        assert_eq!(breakdown.mastery, 0.0);
        assert!(breakdown.total() < 0.0);
    }
}
