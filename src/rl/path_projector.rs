// src/rl/path_projector.rs
//! Greedy roll-out of a learned policy into a [`LearningPath`].
//!
//! The projector only reads the agent, so it can run against a snapshot
//! while another thread keeps training the original.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::agent::QLearningAgent;
use super::environment::{Environment, TerminationReason};
use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::{Intervention, InterventionCatalogue, InterventionId};
use crate::models::state::StudentState;
use crate::models::student_profile::StudentProfile;

/// A runner-up intervention at one step of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub intervention: Intervention,
    pub q_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep {
    pub step: usize,
    pub state: StudentState,
    pub intervention: Intervention,
    /// Q(state, intervention) at projection time.
    pub predicted_reward: f64,
    /// Reward the simulator actually returned for this step.
    pub realized_reward: f64,
    pub next_state: StudentState,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub student_id: String,
    pub initial_state: StudentState,
    pub steps: Vec<PathStep>,
    pub horizon: usize,
    /// `None` when the horizon ran out before the environment ended the episode.
    pub termination: Option<TerminationReason>,
}

impl LearningPath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn final_state(&self) -> StudentState {
        self.steps
            .last()
            .map_or(self.initial_state, |s| s.next_state)
    }

    pub fn interventions(&self) -> Vec<InterventionId> {
        self.steps.iter().map(|s| s.intervention.id).collect()
    }

    pub fn total_predicted_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.predicted_reward).sum()
    }

    pub fn total_realized_reward(&self) -> f64 {
        self.steps.iter().map(|s| s.realized_reward).sum()
    }

    /// Nested tree for hierarchical rendering: each projected step is a node
    /// whose first child is the next step, followed by up to `alternatives`
    /// runner-up interventions as leaves.
    pub fn to_tree(&self, alternatives: usize) -> PathNode {
        let mut child: Option<PathNode> = None;
        for step in self.steps.iter().rev() {
            let mut children = Vec::new();
            if let Some(next) = child.take() {
                children.push(next);
            }
            children.extend(
                step.alternatives
                    .iter()
                    .take(alternatives)
                    .map(|alt| PathNode::alternative(alt, step.step + 1)),
            );
            child = Some(PathNode {
                id: format!("step_{}", step.step),
                name: step.intervention.to_string(),
                kind: NodeKind::Step,
                depth: step.step + 1,
                skill: Some(step.intervention.skill.as_str().to_string()),
                skill_color: Some(step.intervention.skill.color().to_string()),
                intervention_id: Some(step.intervention.id),
                q_value: Some(step.predicted_reward),
                state: Some(step.state),
                children,
            });
        }

        PathNode {
            id: format!("start_{}", self.student_id),
            name: format!("Start ({})", self.student_id),
            kind: NodeKind::Start,
            depth: 0,
            skill: None,
            skill_color: None,
            intervention_id: None,
            q_value: None,
            state: Some(self.initial_state),
            children: child.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Start,
    Step,
    Alternative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervention_id: Option<InterventionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<StudentState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PathNode>,
}

impl PathNode {
    fn alternative(alt: &Alternative, depth: usize) -> Self {
        Self {
            id: format!("alt_{}_{}", depth, alt.intervention.id),
            name: alt.intervention.to_string(),
            kind: NodeKind::Alternative,
            depth,
            skill: Some(alt.intervention.skill.as_str().to_string()),
            skill_color: Some(alt.intervention.skill.color().to_string()),
            intervention_id: Some(alt.intervention.id),
            q_value: Some(alt.q_value),
            state: None,
            children: Vec::new(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(PathNode::node_count).sum::<usize>()
    }
}

#[derive(Debug, Clone)]
pub struct PathProjector {
    catalogue: Arc<InterventionCatalogue>,
    alternatives: usize,
}

impl PathProjector {
    pub const DEFAULT_ALTERNATIVES: usize = 2;

    pub fn new(catalogue: Arc<InterventionCatalogue>) -> Self {
        Self {
            catalogue,
            alternatives: Self::DEFAULT_ALTERNATIVES,
        }
    }

    /// Runner-up interventions recorded per step.
    pub fn with_alternatives(mut self, alternatives: usize) -> Self {
        self.alternatives = alternatives;
        self
    }

    fn lookup(&self, id: InterventionId) -> PlpResult<Intervention> {
        self.catalogue
            .get(id)
            .copied()
            .ok_or_else(|| PlpError::invalid_action(id, "not in the projector's catalogue"))
    }

    /// Runs `env` forward for at most `horizon` steps choosing greedily, and
    /// stops early when the environment reports `done`.
    pub fn project<E: Environment + ?Sized>(
        &self,
        agent: &QLearningAgent,
        env: &mut E,
        profile: &StudentProfile,
        horizon: usize,
    ) -> PlpResult<LearningPath> {
        let initial_state = env.reset(profile);
        let mut path = LearningPath {
            student_id: profile.id.clone(),
            initial_state,
            steps: Vec::with_capacity(horizon),
            horizon,
            termination: None,
        };

        if env.is_terminal(&initial_state) {
            path.termination = Some(TerminationReason::GoalReached);
            return Ok(path);
        }

        let mut state = initial_state;
        for step in 0..horizon {
            let available = env.available_actions(&state);
            let Some((action, predicted_reward)) = agent.greedy_action(&state, &available) else {
                break;
            };
            let intervention = self.lookup(action)?;
            let alternatives = agent
                .table()
                .ranked_actions(&state, &available)
                .iter()
                .filter(|(id, _)| *id != action)
                .take(self.alternatives)
                .map(|(id, q)| {
                    self.lookup(*id).map(|intervention| Alternative {
                        intervention,
                        q_value: *q,
                    })
                })
                .collect::<PlpResult<Vec<_>>>()?;

            let outcome = env.step(action)?;
            debug!(
                "Projection step {}: {} -> {} (Q {:.3})",
                step, state, intervention, predicted_reward
            );
            path.steps.push(PathStep {
                step,
                state,
                intervention,
                predicted_reward,
                realized_reward: outcome.reward,
                next_state: outcome.next_state,
                alternatives,
            });
            state = outcome.next_state;

            if outcome.done {
                path.termination = outcome.termination;
                break;
            }
        }

        info!(
            "Projected {} step path for {} (horizon {}, predicted reward {:.3})",
            path.len(),
            path.student_id,
            horizon,
            path.total_predicted_reward()
        );
        Ok(path)
    }
}
