// src/rl/environment.rs
//! Step-based simulator of a student's learning trajectory.
//!
//! One environment instance serves one episode at a time. Its only mutable
//! state is the current [`StudentState`], the step counter and its random
//! source; concurrent episodes need separate instances.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::profile_encoder::ProfileEncoder;
use super::reward::{RewardBreakdown, RewardModel, RewardWeights};
use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::{Intervention, InterventionCatalogue, InterventionId};
use crate::models::state::{BucketConfig, StudentState, MAX_BUCKETS, MIN_BUCKETS};
use crate::models::student_profile::StudentProfile;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub buckets: BucketConfig,
    pub reward_weights: RewardWeights,
    /// Episodes end with [`TerminationReason::StepLimit`] once this many steps ran.
    pub max_steps: usize,
    /// Growth probability of a perfectly matched standard intervention for a
    /// fully engaged student at the lowest mastery bucket.
    pub base_growth: f64,
    /// Per-step probability that each emotional factor drifts one bucket.
    pub drift_probability: f64,
    /// Probability that a successful step lifts motivation one bucket.
    pub success_motivation_boost: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            buckets: BucketConfig::default(),
            reward_weights: RewardWeights::default(),
            max_steps: 50,
            base_growth: 0.9,
            drift_probability: 0.1,
            success_motivation_boost: 0.3,
        }
    }
}

impl EnvironmentConfig {
    pub fn validate(&self) -> PlpResult<()> {
        for (name, value) in [
            ("emotional_buckets", self.buckets.emotional_buckets),
            ("mastery_buckets", self.buckets.mastery_buckets),
        ] {
            if !(MIN_BUCKETS..=MAX_BUCKETS).contains(&value) {
                return Err(PlpError::configuration(format!(
                    "{} must be in {}..={}, got {}",
                    name, MIN_BUCKETS, MAX_BUCKETS, value
                )));
            }
        }
        if self.max_steps == 0 {
            return Err(PlpError::configuration("max_steps must be at least 1"));
        }
        if !(self.base_growth > 0.0 && self.base_growth.is_finite()) {
            return Err(PlpError::configuration(format!(
                "base_growth must be positive, got {}",
                self.base_growth
            )));
        }
        for (name, p) in [
            ("drift_probability", self.drift_probability),
            ("success_motivation_boost", self.success_motivation_boost),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(PlpError::configuration(format!(
                    "{} must be in [0, 1], got {}",
                    name, p
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationReason {
    /// Every pillar reached the top mastery bucket.
    GoalReached,
    /// The per-episode step cap was hit. A normal ending, not an error.
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub next_state: StudentState,
    pub reward: f64,
    pub done: bool,
    pub termination: Option<TerminationReason>,
    pub breakdown: RewardBreakdown,
    /// Whether the targeted skill gained a bucket.
    pub skill_gained: bool,
}

/// Contract between the training loop / projector and a simulator.
pub trait Environment {
    /// Starts a new episode from a profile snapshot and clears the step counter.
    fn reset(&mut self, profile: &StudentProfile) -> StudentState;

    /// Applies one intervention to the current state.
    fn step(&mut self, action: InterventionId) -> PlpResult<StepOutcome>;

    /// Interventions that may be applied from `state`, in catalogue order.
    fn available_actions(&self, state: &StudentState) -> Vec<InterventionId>;

    /// Whether `state` needs no further steps.
    fn is_terminal(&self, state: &StudentState) -> bool;

    fn current_state(&self) -> Option<StudentState>;
}

pub struct LearningEnvironment<R: Rng = StdRng> {
    config: EnvironmentConfig,
    encoder: ProfileEncoder,
    reward_model: RewardModel,
    catalogue: Arc<InterventionCatalogue>,
    rng: R,
    current: Option<StudentState>,
    steps: usize,
    done: bool,
}

impl LearningEnvironment<StdRng> {
    /// Environment whose stochastic component is seeded for reproducibility.
    pub fn new(
        config: EnvironmentConfig,
        catalogue: Arc<InterventionCatalogue>,
        seed: u64,
    ) -> PlpResult<Self> {
        Self::with_rng(config, catalogue, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> LearningEnvironment<R> {
    pub fn with_rng(
        config: EnvironmentConfig,
        catalogue: Arc<InterventionCatalogue>,
        rng: R,
    ) -> PlpResult<Self> {
        config.validate()?;
        if catalogue.is_empty() {
            return Err(PlpError::configuration("intervention catalogue is empty"));
        }
        Ok(Self {
            encoder: ProfileEncoder::new(config.buckets),
            reward_model: RewardModel::new(config.reward_weights, config.buckets),
            config,
            catalogue,
            rng,
            current: None,
            steps: 0,
            done: false,
        })
    }

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Arc<InterventionCatalogue> {
        &self.catalogue
    }

    pub fn reward_model(&self) -> &RewardModel {
        &self.reward_model
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Starts an episode directly from an already encoded state.
    pub fn reset_to(&mut self, state: StudentState) -> StudentState {
        self.current = Some(state);
        self.steps = 0;
        self.done = self.is_terminal(&state);
        state
    }

    /// Probability that `intervention` lifts its skill one bucket from `state`.
    pub fn growth_probability(&self, state: &StudentState, intervention: &Intervention) -> f64 {
        let b = &self.config.buckets;
        let emotional_top = b.max_emotional() as f64;
        let engagement = 0.4
            + 0.2
                * ((state.motivation as f64 + state.self_efficacy as f64 + state.aptitude as f64)
                    / emotional_top);
        let fit = intervention.strategy.fit(state.style);
        let mastery = state.mastery_of(intervention.skill) as f64;
        let headroom = 1.0 - mastery / b.mastery_buckets as f64;

        (self.config.base_growth
            * intervention.intensity.growth_multiplier()
            * (0.5 + 0.5 * fit)
            * engagement
            * headroom)
            .clamp(0.0, 1.0)
    }

    fn drift(&mut self, level: u8, top: u8) -> u8 {
        if !self.rng.gen_bool(self.config.drift_probability) {
            return level;
        }
        if self.rng.gen_bool(0.5) {
            level.saturating_add(1).min(top)
        } else {
            level.saturating_sub(1)
        }
    }

    fn transition(&mut self, state: &StudentState, intervention: &Intervention) -> (StudentState, bool) {
        let top_mastery = self.config.buckets.max_mastery();
        let top_emotional = self.config.buckets.max_emotional();

        let p = self.growth_probability(state, intervention);
        let gained = self.rng.gen_bool(p);
        let mut next = *state;
        if gained {
            let level = state.mastery_of(intervention.skill);
            next = next.with_mastery(intervention.skill, level.saturating_add(1).min(top_mastery));
        }

        let motivation = self.drift(next.motivation, top_emotional);
        let self_efficacy = self.drift(next.self_efficacy, top_emotional);
        let motivation = if gained && self.rng.gen_bool(self.config.success_motivation_boost) {
            motivation.saturating_add(1).min(top_emotional)
        } else {
            motivation
        };

        (next.with_emotions(motivation, self_efficacy), gained)
    }
}

impl<R: Rng> Environment for LearningEnvironment<R> {
    fn reset(&mut self, profile: &StudentProfile) -> StudentState {
        let state = self.encoder.encode(profile);
        self.reset_to(state)
    }

    fn step(&mut self, action: InterventionId) -> PlpResult<StepOutcome> {
        let state = self.current.ok_or(PlpError::EpisodeNotStarted)?;
        if self.done {
            return Err(PlpError::EpisodeFinished { steps: self.steps });
        }
        let intervention = *self
            .catalogue
            .get(action)
            .ok_or_else(|| PlpError::invalid_action(action, "not in the intervention catalogue"))?;
        if state.mastery_of(intervention.skill) >= self.config.buckets.max_mastery() {
            return Err(PlpError::invalid_action(
                action,
                format!("{} is already at the top mastery bucket", intervention.skill),
            ));
        }

        self.steps += 1;
        let (next_state, skill_gained) = self.transition(&state, &intervention);
        let breakdown = self.reward_model.score(&state, &intervention, &next_state);

        let termination = if next_state.all_mastered(&self.config.buckets) {
            Some(TerminationReason::GoalReached)
        } else if self.steps >= self.config.max_steps {
            Some(TerminationReason::StepLimit)
        } else {
            None
        };

        self.current = Some(next_state);
        self.done = termination.is_some();

        debug!(
            "Step {}: {} applied {} -> {} (gained: {}, reward {:.3})",
            self.steps,
            state,
            intervention,
            next_state,
            skill_gained,
            breakdown.total()
        );

        Ok(StepOutcome {
            next_state,
            reward: breakdown.total(),
            done: self.done,
            termination,
            breakdown,
            skill_gained,
        })
    }

    fn available_actions(&self, state: &StudentState) -> Vec<InterventionId> {
        let top = self.config.buckets.max_mastery();
        self.catalogue
            .iter()
            .filter(|i| state.mastery_of(i.skill) < top)
            .map(|i| i.id)
            .collect()
    }

    fn is_terminal(&self, state: &StudentState) -> bool {
        state.all_mastered(&self.config.buckets)
    }

    fn current_state(&self) -> Option<StudentState> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skill::Skill;
    use crate::models::student_profile::{KolbStyle, ProfileType};

    fn env(seed: u64) -> LearningEnvironment {
        LearningEnvironment::new(
            EnvironmentConfig::default(),
            Arc::new(InterventionCatalogue::standard()),
            seed,
        )
        .unwrap()
    }

    fn low_state() -> StudentState {
        StudentState {
            motivation: 1,
            self_efficacy: 1,
            aptitude: 1,
            style: KolbStyle::Divergent,
            mastery: [0, 0, 0, 0],
        }
    }

    #[test]
    fn test_same_seed_gives_same_transitions() {
        let mut a = env(42);
        let mut b = env(42);
        let profile = StudentProfile::sample(ProfileType::Average);
        assert_eq!(a.reset(&profile), b.reset(&profile));

        for step in 0..30 {
            let state = a.current_state().unwrap();
            let actions = a.available_actions(&state);
            if actions.is_empty() {
                break;
            }
            let action = actions[step % actions.len()];
            let out_a = a.step(action).unwrap();
            let out_b = b.step(action).unwrap();
            assert_eq!(out_a, out_b);
            if out_a.done {
                break;
            }
        }
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut e = env(1);
        assert!(matches!(e.step(0), Err(PlpError::EpisodeNotStarted)));
    }

    #[test]
    fn test_unknown_action_is_recoverable_and_does_not_count() {
        let mut e = env(1);
        e.reset_to(low_state());
        let err = e.step(9_999).unwrap_err();
        assert!(matches!(err, PlpError::InvalidAction { action: 9_999, .. }));
        assert!(err.is_recoverable());
        assert_eq!(e.steps(), 0);
        assert!(e.step(0).is_ok());
        assert_eq!(e.steps(), 1);
    }

    #[test]
    fn test_masked_action_is_rejected() {
        let mut e = env(1);
        let state = low_state().with_mastery(Skill::Literacy, 4);
        e.reset_to(state);
        let literacy_action = e
            .catalogue()
            .iter()
            .find(|i| i.skill == Skill::Literacy)
            .unwrap()
            .id;
        assert!(!e.available_actions(&state).contains(&literacy_action));
        assert!(matches!(
            e.step(literacy_action),
            Err(PlpError::InvalidAction { .. })
        ));
    }

    #[test]
    fn test_step_limit_terminates_episode() {
        let config = EnvironmentConfig {
            max_steps: 3,
            base_growth: 0.01,
            ..EnvironmentConfig::default()
        };
        let mut e =
            LearningEnvironment::new(config, Arc::new(InterventionCatalogue::standard()), 9).unwrap();
        e.reset_to(low_state());
        let mut last = None;
        for _ in 0..3 {
            last = Some(e.step(0).unwrap());
        }
        let last = last.unwrap();
        assert!(last.done);
        assert_eq!(last.termination, Some(TerminationReason::StepLimit));
        assert!(matches!(e.step(0), Err(PlpError::EpisodeFinished { steps: 3 })));
    }

    #[test]
    fn test_goal_reached_termination() {
        let config = EnvironmentConfig {
            base_growth: 100.0,
            drift_probability: 0.0,
            ..EnvironmentConfig::default()
        };
        let mut e =
            LearningEnvironment::new(config, Arc::new(InterventionCatalogue::standard()), 5).unwrap();
        let nearly_done = low_state().with_mastery(Skill::Literacy, 4)
            .with_mastery(Skill::Numeracy, 4)
            .with_mastery(Skill::Digital, 4)
            .with_mastery(Skill::Citizenship, 3);
        e.reset_to(nearly_done);
        let action = e.available_actions(&nearly_done)[0];
        let outcome = e.step(action).unwrap();
        assert!(outcome.skill_gained);
        assert_eq!(outcome.termination, Some(TerminationReason::GoalReached));
        assert!(outcome.breakdown.goal > 0.0);
    }

    #[test]
    fn test_terminal_start_state_is_detected() {
        let mut e = env(3);
        let profile = StudentProfile::sample(ProfileType::HighPerformer).with_uniform_knowledge(100.0);
        let state = e.reset(&profile);
        assert!(e.is_terminal(&state));
        assert!(e.available_actions(&state).is_empty());
        assert!(matches!(e.step(0), Err(PlpError::EpisodeFinished { .. })));
    }

    #[test]
    fn test_growth_probability_has_diminishing_returns() {
        let e = env(0);
        let action = *e.catalogue().get(0).unwrap();
        let mut previous = f64::INFINITY;
        for level in 0..4 {
            let state = low_state().with_mastery(action.skill, level);
            let p = e.growth_probability(&state, &action);
            assert!(p < previous);
            previous = p;
        }
    }

    #[test]
    fn test_mastery_never_decreases() {
        let mut e = env(77);
        e.reset_to(low_state());
        let mut state = low_state();
        for i in 0..50 {
            let actions = e.available_actions(&state);
            if actions.is_empty() {
                break;
            }
            let out = e.step(actions[i % actions.len()]).unwrap();
            for skill in Skill::ALL {
                assert!(out.next_state.mastery_of(skill) >= state.mastery_of(skill));
            }
            state = out.next_state;
            if out.done {
                break;
            }
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EnvironmentConfig {
            drift_probability: 1.5,
            ..EnvironmentConfig::default()
        };
        assert!(matches!(
            LearningEnvironment::new(config, Arc::new(InterventionCatalogue::standard()), 0),
            Err(PlpError::Configuration { .. })
        ));
    }
}
