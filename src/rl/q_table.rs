// src/rl/q_table.rs
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::InterventionId;
use crate::models::state::StudentState;

/// One flat record of the table: state tuple, action id, value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QTableRow {
    pub state: StudentState,
    pub action: InterventionId,
    pub value: f64,
}

/// Action-value estimates keyed by (state, intervention). Pairs never written
/// read as `default_value` (zero or optimistic initialization).
#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    entries: HashMap<(StudentState, InterventionId), f64>,
    default_value: f64,
}

impl Default for QTable {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl QTable {
    pub fn new(default_value: f64) -> Self {
        Self {
            entries: HashMap::new(),
            default_value,
        }
    }

    pub fn default_value(&self) -> f64 {
        self.default_value
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, state: &StudentState, action: InterventionId) -> f64 {
        self.entries
            .get(&(*state, action))
            .copied()
            .unwrap_or(self.default_value)
    }

    pub fn set(&mut self, state: StudentState, action: InterventionId, value: f64) {
        self.entries.insert((state, action), value);
    }

    /// Highest-valued action among `actions`. Ties go to the lowest id so the
    /// greedy policy is reproducible.
    pub fn best_action(
        &self,
        state: &StudentState,
        actions: &[InterventionId],
    ) -> Option<(InterventionId, f64)> {
        let mut best: Option<(InterventionId, f64)> = None;
        for &action in actions {
            let value = self.get(state, action);
            best = match best {
                None => Some((action, value)),
                Some((best_id, best_value)) => {
                    if value > best_value || (value == best_value && action < best_id) {
                        Some((action, value))
                    } else {
                        Some((best_id, best_value))
                    }
                }
            };
        }
        best
    }

    /// Max over `actions` of Q(state, a); zero when no action is available.
    pub fn max_value(&self, state: &StudentState, actions: &[InterventionId]) -> f64 {
        self.best_action(state, actions).map_or(0.0, |(_, v)| v)
    }

    /// Actions ranked by value (descending, ties by id).
    pub fn ranked_actions(
        &self,
        state: &StudentState,
        actions: &[InterventionId],
    ) -> Vec<(InterventionId, f64)> {
        let mut ranked: Vec<(InterventionId, f64)> =
            actions.iter().map(|a| (*a, self.get(state, *a))).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked
    }

    /// Flat rows sorted by (state, action), so equal tables give equal output.
    pub fn to_rows(&self) -> Vec<QTableRow> {
        let mut rows: Vec<QTableRow> = self
            .entries
            .iter()
            .map(|((state, action), value)| QTableRow {
                state: *state,
                action: *action,
                value: *value,
            })
            .collect();
        rows.sort_by(|a, b| a.state.cmp(&b.state).then(a.action.cmp(&b.action)));
        rows
    }

    pub fn from_rows(default_value: f64, rows: &[QTableRow]) -> PlpResult<Self> {
        let mut table = Self::new(default_value);
        for row in rows {
            if !row.value.is_finite() {
                return Err(PlpError::persistence(
                    format!("non-finite value {} for {} / {}", row.value, row.state, row.action),
                    None,
                ));
            }
            if table.entries.insert((row.state, row.action), row.value).is_some() {
                return Err(PlpError::persistence(
                    format!("duplicate row for {} / {}", row.state, row.action),
                    None,
                ));
            }
        }
        Ok(table)
    }

    pub fn distinct_states(&self) -> usize {
        let mut states: Vec<&StudentState> = self.entries.keys().map(|(s, _)| s).collect();
        states.sort();
        states.dedup();
        states.len()
    }
}
