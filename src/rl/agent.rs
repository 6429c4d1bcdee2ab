// src/rl/agent.rs
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::environment::TerminationReason;
use super::q_table::QTable;
use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::InterventionId;
use crate::models::state::StudentState;

/// Unit of experience, consumed by [`QLearningAgent::update`] and then dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: StudentState,
    pub action: InterventionId,
    pub reward: f64,
    pub next_state: StudentState,
    pub done: bool,
    /// Actions available from `next_state`; the max in the update target runs
    /// over these only. Empty when `done`.
    pub next_available: Vec<InterventionId>,
    pub termination: Option<TerminationReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentParams {
    pub learning_rate: f64,
    pub discount_factor: f64,
    /// Value read for (state, action) pairs never updated.
    pub initial_q_value: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            discount_factor: 0.95,
            initial_q_value: 0.0,
        }
    }
}

impl AgentParams {
    pub fn validate(&self) -> PlpResult<()> {
        for (name, value) in [
            ("learning_rate", self.learning_rate),
            ("discount_factor", self.discount_factor),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(PlpError::configuration(format!(
                    "{} must lie in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !self.initial_q_value.is_finite() {
            return Err(PlpError::configuration("initial_q_value must be finite"));
        }
        Ok(())
    }
}

/// Multiplicative epsilon decay bounded below by a floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsilonSchedule {
    pub start: f64,
    pub floor: f64,
    pub decay: f64,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            start: 1.0,
            floor: 0.01,
            decay: 0.995,
        }
    }
}

impl EpsilonSchedule {
    pub fn validate(&self) -> PlpResult<()> {
        if !(0.0..=1.0).contains(&self.start) || !(0.0..=1.0).contains(&self.floor) {
            return Err(PlpError::configuration(format!(
                "epsilon start ({}) and floor ({}) must lie in [0, 1]",
                self.start, self.floor
            )));
        }
        if self.floor > self.start {
            return Err(PlpError::configuration(format!(
                "epsilon floor {} is above start {}",
                self.floor, self.start
            )));
        }
        if !(self.decay > 0.0 && self.decay <= 1.0) {
            return Err(PlpError::configuration(format!(
                "epsilon decay must lie in (0, 1], got {}",
                self.decay
            )));
        }
        Ok(())
    }

    pub fn next(&self, epsilon: f64) -> f64 {
        (epsilon * self.decay).max(self.floor)
    }
}

/// Tabular Q-learning agent. It never touches an environment; everything it
/// learns arrives through [`Transition`]s.
#[derive(Debug, Clone)]
pub struct QLearningAgent {
    table: QTable,
    params: AgentParams,
    epsilon: f64,
    updates: u64,
}

impl QLearningAgent {
    pub fn new(params: AgentParams, epsilon: f64) -> PlpResult<Self> {
        Self::from_table(QTable::new(params.initial_q_value), params, epsilon)
    }

    pub fn from_table(table: QTable, params: AgentParams, epsilon: f64) -> PlpResult<Self> {
        params.validate()?;
        if !(0.0..=1.0).contains(&epsilon) {
            return Err(PlpError::configuration(format!(
                "epsilon must lie in [0, 1], got {}",
                epsilon
            )));
        }
        Ok(Self {
            table,
            params,
            epsilon,
            updates: 0,
        })
    }

    pub fn params(&self) -> &AgentParams {
        &self.params
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.clamp(0.0, 1.0);
    }

    pub fn decay_epsilon(&mut self, schedule: &EpsilonSchedule) -> f64 {
        self.epsilon = schedule.next(self.epsilon);
        self.epsilon
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Current estimate for one pair.
    pub fn estimate(&self, state: &StudentState, action: InterventionId) -> f64 {
        self.table.get(state, action)
    }

    /// Epsilon-greedy choice among `available`. With `explore == false` the
    /// choice is purely greedy and consumes no randomness.
    pub fn select_action<R: Rng + ?Sized>(
        &self,
        state: &StudentState,
        available: &[InterventionId],
        explore: bool,
        rng: &mut R,
    ) -> PlpResult<InterventionId> {
        if available.is_empty() {
            return Err(PlpError::NoAvailableActions);
        }
        if explore && rng.gen_bool(self.epsilon) {
            if let Some(action) = available.choose(rng) {
                return Ok(*action);
            }
        }
        self.greedy_action(state, available)
            .map(|(action, _)| action)
            .ok_or(PlpError::NoAvailableActions)
    }

    pub fn greedy_action(
        &self,
        state: &StudentState,
        available: &[InterventionId],
    ) -> Option<(InterventionId, f64)> {
        self.table.best_action(state, available)
    }

    /// Standard Q-learning update; returns the new estimate.
    pub fn update(&mut self, transition: &Transition) -> f64 {
        let old = self.table.get(&transition.state, transition.action);
        let future = if transition.done {
            0.0
        } else {
            self.table
                .max_value(&transition.next_state, &transition.next_available)
        };
        let target = transition.reward + self.params.discount_factor * future;
        let new = old + self.params.learning_rate * (target - old);
        self.table.set(transition.state, transition.action, new);
        self.updates += 1;

        debug!(
            "Q update {} / {}: {:.4} -> {:.4} (target {:.4})",
            transition.state, transition.action, old, new, target
        );
        new
    }

    /// Replaces the learned table.
    pub fn load(&mut self, table: QTable) {
        info!(
            "Loading Q-table with {} entries over {} states",
            table.len(),
            table.distinct_states()
        );
        self.table = table;
    }

    /// Independent copy of the learned table.
    pub fn snapshot(&self) -> QTable {
        self.table.clone()
    }

    pub fn get_stats_display(&self) -> String {
        let mut output = String::from("Q-Learning Agent Statistics:\n");
        output.push_str(&format!(
            "  learning_rate: {:.3} | discount_factor: {:.3} | epsilon: {:.4}\n",
            self.params.learning_rate, self.params.discount_factor, self.epsilon
        ));
        output.push_str(&format!(
            "  entries: {} | states visited: {} | updates: {}\n",
            self.table.len(),
            self.table.distinct_states(),
            self.updates
        ));
        output
    }
}
