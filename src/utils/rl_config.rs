// src/utils/rl_config.rs
use log::{info, warn};
use std::env;
use std::str::FromStr;

use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::{Intensity, InterventionCatalogue, Strategy};
use crate::models::state::{BucketConfig, StateSpace, MAX_BUCKETS, MIN_BUCKETS};
use crate::rl::agent::{AgentParams, EpsilonSchedule};
use crate::rl::convergence::ConvergenceConfig;
use crate::rl::environment::EnvironmentConfig;
use crate::rl::reward::RewardWeights;
use crate::rl::training::TrainingConfig;

const DEFAULT_TABLE_PATH: &str = "data/q_table.json";
const DEFAULT_MAX_TABLE_ENTRIES: u64 = 10_000_000;

/// Engine settings read from `PLP_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct RLConfig {
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub epsilon_start: f64,
    pub epsilon_floor: f64,
    pub epsilon_decay: f64,
    pub initial_q_value: f64,
    pub max_steps: usize,
    pub emotional_buckets: u8,
    pub mastery_buckets: u8,
    pub strategies: Vec<Strategy>,
    pub intensities: Vec<Intensity>,
    pub reward_weights: RewardWeights,
    pub base_growth: f64,
    pub drift_probability: f64,
    pub success_motivation_boost: f64,
    pub convergence_window: usize,
    pub convergence_tolerance: f64,
    pub convergence_patience: usize,
    pub stop_when_stable: bool,
    pub checkpoint_every: Option<usize>,
    pub history_every: usize,
    /// Upper bound on states x interventions.
    pub max_table_entries: u64,
    pub table_path: String,
    pub seed: u64,
}

impl Default for RLConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn parse_or<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable value '{}' for {}", raw, key);
                default
            }
        },
        None => default,
    }
}

fn parse_list<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, all: &[T]) -> Vec<T>
where
    T: FromStr<Err = String> + Copy + PartialEq,
{
    let raw = lookup(key).unwrap_or_else(|| "all".to_string());
    if raw.trim().eq_ignore_ascii_case("all") {
        return all.to_vec();
    }
    let mut parsed = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.parse::<T>() {
            Ok(value) if !parsed.contains(&value) => parsed.push(value),
            Ok(_) => {}
            Err(e) => warn!("{}: {}", key, e),
        }
    }
    parsed
}

impl RLConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        let agent = AgentParams::default();
        let epsilon = EpsilonSchedule::default();
        let environment = EnvironmentConfig::default();
        let convergence = ConvergenceConfig::default();
        let training = TrainingConfig::default();

        let checkpoint_every = parse_or(lookup, "PLP_CHECKPOINT_EVERY", 0usize);

        Self {
            learning_rate: parse_or(lookup, "PLP_LEARNING_RATE", agent.learning_rate),
            discount_factor: parse_or(lookup, "PLP_DISCOUNT_FACTOR", agent.discount_factor),
            epsilon_start: parse_or(lookup, "PLP_EPSILON_START", epsilon.start),
            epsilon_floor: parse_or(lookup, "PLP_EPSILON_FLOOR", epsilon.floor),
            epsilon_decay: parse_or(lookup, "PLP_EPSILON_DECAY", epsilon.decay),
            initial_q_value: parse_or(lookup, "PLP_INITIAL_Q_VALUE", agent.initial_q_value),
            max_steps: parse_or(lookup, "PLP_MAX_STEPS", environment.max_steps),
            emotional_buckets: parse_or(
                lookup,
                "PLP_EMOTIONAL_BUCKETS",
                environment.buckets.emotional_buckets,
            ),
            mastery_buckets: parse_or(
                lookup,
                "PLP_MASTERY_BUCKETS",
                environment.buckets.mastery_buckets,
            ),
            strategies: parse_list(lookup, "PLP_STRATEGIES", &Strategy::ALL),
            intensities: parse_list(lookup, "PLP_INTENSITIES", &Intensity::ALL),
            reward_weights: RewardWeights {
                mastery: parse_or(lookup, "PLP_REWARD_W_MASTERY", environment.reward_weights.mastery),
                misalignment: parse_or(
                    lookup,
                    "PLP_REWARD_W_MISALIGNMENT",
                    environment.reward_weights.misalignment,
                ),
                balance: parse_or(lookup, "PLP_REWARD_W_BALANCE", environment.reward_weights.balance),
                effort: parse_or(lookup, "PLP_REWARD_W_EFFORT", environment.reward_weights.effort),
                goal: parse_or(lookup, "PLP_REWARD_W_GOAL", environment.reward_weights.goal),
            },
            base_growth: parse_or(lookup, "PLP_BASE_GROWTH", environment.base_growth),
            drift_probability: parse_or(lookup, "PLP_DRIFT_PROBABILITY", environment.drift_probability),
            success_motivation_boost: parse_or(
                lookup,
                "PLP_SUCCESS_MOTIVATION_BOOST",
                environment.success_motivation_boost,
            ),
            convergence_window: parse_or(lookup, "PLP_CONVERGENCE_WINDOW", convergence.window),
            convergence_tolerance: parse_or(
                lookup,
                "PLP_CONVERGENCE_TOLERANCE",
                convergence.tolerance,
            ),
            convergence_patience: parse_or(lookup, "PLP_CONVERGENCE_PATIENCE", convergence.patience),
            stop_when_stable: parse_or(lookup, "PLP_STOP_WHEN_STABLE", convergence.stop_when_stable),
            checkpoint_every: (checkpoint_every > 0).then_some(checkpoint_every),
            history_every: parse_or(lookup, "PLP_HISTORY_EVERY", training.history_every),
            max_table_entries: parse_or(lookup, "PLP_MAX_TABLE_ENTRIES", DEFAULT_MAX_TABLE_ENTRIES),
            table_path: lookup("PLP_TABLE_PATH").unwrap_or_else(|| DEFAULT_TABLE_PATH.to_string()),
            seed: parse_or(lookup, "PLP_SEED", 42u64),
        }
    }

    pub fn buckets(&self) -> BucketConfig {
        BucketConfig {
            emotional_buckets: self.emotional_buckets,
            mastery_buckets: self.mastery_buckets,
        }
    }

    pub fn agent_params(&self) -> AgentParams {
        AgentParams {
            learning_rate: self.learning_rate,
            discount_factor: self.discount_factor,
            initial_q_value: self.initial_q_value,
        }
    }

    pub fn epsilon_schedule(&self) -> EpsilonSchedule {
        EpsilonSchedule {
            start: self.epsilon_start,
            floor: self.epsilon_floor,
            decay: self.epsilon_decay,
        }
    }

    pub fn environment_config(&self) -> EnvironmentConfig {
        EnvironmentConfig {
            buckets: self.buckets(),
            reward_weights: self.reward_weights,
            max_steps: self.max_steps,
            base_growth: self.base_growth,
            drift_probability: self.drift_probability,
            success_motivation_boost: self.success_motivation_boost,
        }
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            epsilon: self.epsilon_schedule(),
            convergence: ConvergenceConfig {
                window: self.convergence_window,
                tolerance: self.convergence_tolerance,
                patience: self.convergence_patience,
                stop_when_stable: self.stop_when_stable,
            },
            checkpoint_every: self.checkpoint_every,
            history_every: self.history_every,
            ..TrainingConfig::default()
        }
    }

    pub fn catalogue(&self) -> PlpResult<InterventionCatalogue> {
        InterventionCatalogue::build(&self.strategies, &self.intensities)
    }

    /// Every check that must pass before training starts.
    pub fn validate(&self) -> PlpResult<()> {
        for (name, value) in [
            ("PLP_EMOTIONAL_BUCKETS", self.emotional_buckets),
            ("PLP_MASTERY_BUCKETS", self.mastery_buckets),
        ] {
            if !(MIN_BUCKETS..=MAX_BUCKETS).contains(&value) {
                return Err(PlpError::configuration(format!(
                    "{} must be in {}..={}, got {}",
                    name, MIN_BUCKETS, MAX_BUCKETS, value
                )));
            }
        }
        self.agent_params().validate()?;
        self.environment_config().validate()?;
        self.training_config().validate()?;

        let catalogue = self.catalogue()?;
        let states = StateSpace::new(self.buckets()).size();
        let entries = states.saturating_mul(catalogue.len() as u64);
        if entries > self.max_table_entries {
            return Err(PlpError::configuration(format!(
                "state space of {} states x {} interventions = {} entries exceeds PLP_MAX_TABLE_ENTRIES ({})",
                states,
                catalogue.len(),
                entries,
                self.max_table_entries
            )));
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!("🤖 Q-learning configuration:");
        info!(
            "   learning_rate: {} | discount_factor: {} | initial Q: {}",
            self.learning_rate, self.discount_factor, self.initial_q_value
        );
        info!(
            "   epsilon: start {} -> floor {} (decay {})",
            self.epsilon_start, self.epsilon_floor, self.epsilon_decay
        );
        info!(
            "   buckets: emotional {} | mastery {} | state space {} states",
            self.emotional_buckets,
            self.mastery_buckets,
            StateSpace::new(self.buckets()).size()
        );
        info!(
            "   catalogue: {} strategies x 4 skills x {} intensities",
            self.strategies.len(),
            self.intensities.len()
        );
        info!(
            "   reward weights: mastery {} | misalignment {} | balance {} | effort {} | goal {}",
            self.reward_weights.mastery,
            self.reward_weights.misalignment,
            self.reward_weights.balance,
            self.reward_weights.effort,
            self.reward_weights.goal
        );
        info!(
            "   max_steps: {} | convergence window {} (tolerance {}, patience {}, stop when stable: {})",
            self.max_steps,
            self.convergence_window,
            self.convergence_tolerance,
            self.convergence_patience,
            self.stop_when_stable
        );
        match self.checkpoint_every {
            Some(every) => info!("   checkpoints every {} episodes to {}", every, self.table_path),
            None => info!("   no periodic checkpoints; table path {}", self.table_path),
        }
        info!("   seed: {}", self.seed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> RLConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RLConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = RLConfig::default();
        assert_eq!(config.learning_rate, 0.1);
        assert_eq!(config.strategies.len(), 8);
        assert_eq!(config.checkpoint_every, None);
        assert!(config.validate().is_ok());
        assert_eq!(config.catalogue().unwrap().len(), 96);
    }

    #[test]
    fn test_overrides_and_lists() {
        let config = config_from(&[
            ("PLP_LEARNING_RATE", "0.25"),
            ("PLP_STRATEGIES", "scaffolding, gamification, nonsense, scaffolding"),
            ("PLP_INTENSITIES", "standard"),
            ("PLP_CHECKPOINT_EVERY", "100"),
            ("PLP_MASTERY_BUCKETS", "4"),
            ("PLP_REWARD_W_BALANCE", "0.5"),
        ]);
        assert_eq!(config.learning_rate, 0.25);
        assert_eq!(config.strategies, vec![Strategy::Scaffolding, Strategy::Gamification]);
        assert_eq!(config.intensities, vec![Intensity::Standard]);
        assert_eq!(config.checkpoint_every, Some(100));
        assert_eq!(config.environment_config().buckets.mastery_buckets, 4);
        assert_eq!(config.environment_config().reward_weights.balance, 0.5);
        assert_eq!(config.catalogue().unwrap().len(), 2 * 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparsable_value_falls_back_to_default() {
        let config = config_from(&[("PLP_DISCOUNT_FACTOR", "lots")]);
        assert_eq!(config.discount_factor, 0.95);
    }

    #[test]
    fn test_invalid_hyperparameters_fail_validation() {
        for pairs in [
            vec![("PLP_LEARNING_RATE", "0")],
            vec![("PLP_DISCOUNT_FACTOR", "1.5")],
            vec![("PLP_EPSILON_FLOOR", "0.9"), ("PLP_EPSILON_START", "0.5")],
            vec![("PLP_MASTERY_BUCKETS", "1")],
            vec![("PLP_MAX_STEPS", "0")],
            vec![("PLP_STRATEGIES", "nonsense")],
            vec![("PLP_CONVERGENCE_WINDOW", "0")],
        ] {
            let config = config_from(&pairs);
            assert!(
                matches!(config.validate(), Err(PlpError::Configuration { .. })),
                "{:?} should be rejected",
                pairs
            );
        }
    }

    #[test]
    fn test_oversized_state_space_is_rejected() {
        let config = config_from(&[
            ("PLP_EMOTIONAL_BUCKETS", "10"),
            ("PLP_MASTERY_BUCKETS", "10"),
        ]);
        assert!(matches!(config.validate(), Err(PlpError::Configuration { .. })));

        let small_limit = config_from(&[("PLP_MAX_TABLE_ENTRIES", "1000")]);
        assert!(small_limit.validate().is_err());
    }
}
