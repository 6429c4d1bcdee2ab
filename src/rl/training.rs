// src/rl/training.rs
//! Episode loop: reset, select, step, update, repeat until done.
//!
//! A [`Trainer`] is the single writer of its agent's table. Checkpoints and
//! the stop flag are only consulted between episodes.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::agent::{EpsilonSchedule, QLearningAgent, Transition};
use super::convergence::{ConvergenceConfig, ConvergenceTracker};
use super::environment::{Environment, TerminationReason};
use super::persistence::{QTableStore, TableMetadata};
use crate::errors::{PlpError, PlpResult};
use crate::models::student_profile::StudentProfile;
use crate::utils::progress_config::ProgressConfig;

/// Source of initial profiles, one per episode.
pub trait ProfileSampler {
    fn sample(&mut self, rng: &mut StdRng) -> StudentProfile;
}

impl<F> ProfileSampler for F
where
    F: FnMut(&mut StdRng) -> StudentProfile,
{
    fn sample(&mut self, rng: &mut StdRng) -> StudentProfile {
        self(rng)
    }
}

/// Cycles through a pool of virtual clones of one base profile, nudging each
/// a little further every time it is handed out.
#[derive(Debug, Clone)]
pub struct CloneSampler {
    pool: Vec<StudentProfile>,
    episode_variation: f64,
    next: usize,
}

impl CloneSampler {
    pub const DEFAULT_POOL_SIZE: usize = 10;
    pub const DEFAULT_POOL_VARIATION: f64 = 0.15;
    pub const DEFAULT_EPISODE_VARIATION: f64 = 0.05;

    pub fn new(
        base: &StudentProfile,
        pool_size: usize,
        pool_variation: f64,
        episode_variation: f64,
        rng: &mut StdRng,
    ) -> Self {
        let mut pool = Vec::with_capacity(pool_size.max(1));
        pool.push(base.clone());
        while pool.len() < pool_size {
            pool.push(base.virtual_clone(pool_variation, rng));
        }
        Self {
            pool,
            episode_variation,
            next: 0,
        }
    }

    pub fn with_defaults(base: &StudentProfile, rng: &mut StdRng) -> Self {
        Self::new(
            base,
            Self::DEFAULT_POOL_SIZE,
            Self::DEFAULT_POOL_VARIATION,
            Self::DEFAULT_EPISODE_VARIATION,
            rng,
        )
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl ProfileSampler for CloneSampler {
    fn sample(&mut self, rng: &mut StdRng) -> StudentProfile {
        let profile = &self.pool[self.next % self.pool.len()];
        self.next = self.next.wrapping_add(1);
        profile.virtual_clone(self.episode_variation, rng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epsilon: EpsilonSchedule,
    pub convergence: ConvergenceConfig,
    /// Save to the attached store every N episodes.
    pub checkpoint_every: Option<usize>,
    /// Keep an [`EpisodeSummary`] every N episodes in the report history.
    pub history_every: usize,
    /// Invalid actions tolerated within one episode before it is abandoned.
    pub max_invalid_actions: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epsilon: EpsilonSchedule::default(),
            convergence: ConvergenceConfig::default(),
            checkpoint_every: None,
            history_every: 50,
            max_invalid_actions: 10,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> PlpResult<()> {
        self.epsilon.validate()?;
        self.convergence.validate()?;
        if self.history_every == 0 {
            return Err(PlpError::configuration("history_every must be at least 1"));
        }
        if self.checkpoint_every == Some(0) {
            return Err(PlpError::configuration("checkpoint_every must be at least 1 when set"));
        }
        Ok(())
    }
}

/// What happened during one episode. Transitions are kept for diagnostics
/// only; the agent has already consumed them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeTrace {
    pub transitions: Vec<Transition>,
    /// `None` when the episode was abandoned before the environment ended it.
    pub termination: Option<TerminationReason>,
    /// The episode began in a terminal state and ran no steps.
    pub started_terminal: bool,
    pub invalid_actions: usize,
}

impl EpisodeTrace {
    pub fn total_reward(&self) -> f64 {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub episode: usize,
    pub total_reward: f64,
    pub steps: usize,
    pub epsilon: f64,
    pub termination: Option<TerminationReason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Stability reached with `stop_when_stable` set.
    Stable,
    /// The cooperative stop flag was raised.
    Requested,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub episodes_requested: usize,
    pub episodes_run: usize,
    pub trailing_average_rewards: Vec<f64>,
    pub final_epsilon: f64,
    pub stable: bool,
    pub stable_since_episode: Option<usize>,
    pub goal_reached_episodes: usize,
    pub step_limit_episodes: usize,
    pub abandoned_episodes: usize,
    pub invalid_actions: usize,
    pub checkpoints_saved: usize,
    pub checkpoint_failures: usize,
    pub stopped_early: Option<StopReason>,
    pub history: Vec<EpisodeSummary>,
}

impl ConvergenceReport {
    pub fn final_trailing_average(&self) -> Option<f64> {
        self.trailing_average_rewards.last().copied()
    }
}

pub struct Trainer<'s, E: Environment> {
    env: E,
    agent: QLearningAgent,
    config: TrainingConfig,
    rng: StdRng,
    store: Option<&'s dyn QTableStore>,
    progress: ProgressConfig,
    stop_flag: Arc<AtomicBool>,
    run_id: Uuid,
    episodes_completed: usize,
}

impl<'s, E: Environment> Trainer<'s, E> {
    /// Validates the training configuration and resets the agent's epsilon to
    /// the schedule start.
    pub fn new(env: E, mut agent: QLearningAgent, config: TrainingConfig, seed: u64) -> PlpResult<Self> {
        config.validate()?;
        agent.set_epsilon(config.epsilon.start);
        Ok(Self {
            env,
            agent,
            config,
            rng: StdRng::seed_from_u64(seed),
            store: None,
            progress: ProgressConfig::disabled(),
            stop_flag: Arc::new(AtomicBool::new(false)),
            run_id: Uuid::new_v4(),
            episodes_completed: 0,
        })
    }

    /// Store used for periodic checkpoints and [`Trainer::save`].
    pub fn with_store(mut self, store: &'s dyn QTableStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    /// Raising the returned flag stops training before the next episode.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_flag)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn agent(&self) -> &QLearningAgent {
        &self.agent
    }

    pub fn into_agent(self) -> QLearningAgent {
        self.agent
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn episodes_completed(&self) -> usize {
        self.episodes_completed
    }

    /// Runs one exploring episode from `profile`, updating the agent after
    /// every step. An episode that starts terminal returns an empty trace.
    pub fn run_episode(&mut self, profile: &StudentProfile) -> PlpResult<EpisodeTrace> {
        let mut state = self.env.reset(profile);
        let mut trace = EpisodeTrace::default();

        if self.env.is_terminal(&state) {
            debug!("Episode starts terminal at {}; nothing to learn", state);
            trace.started_terminal = true;
            trace.termination = Some(TerminationReason::GoalReached);
            return Ok(trace);
        }

        loop {
            let available = self.env.available_actions(&state);
            let action = self
                .agent
                .select_action(&state, &available, true, &mut self.rng)?;

            let outcome = match self.env.step(action) {
                Ok(outcome) => outcome,
                Err(e @ PlpError::InvalidAction { .. }) => {
                    trace.invalid_actions += 1;
                    warn!("Re-sampling after invalid action: {}", e);
                    if trace.invalid_actions > self.config.max_invalid_actions {
                        warn!(
                            "Abandoning episode after {} invalid actions",
                            trace.invalid_actions
                        );
                        return Ok(trace);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            let next_available = if outcome.done {
                Vec::new()
            } else {
                self.env.available_actions(&outcome.next_state)
            };
            let transition = Transition {
                state,
                action,
                reward: outcome.reward,
                next_state: outcome.next_state,
                done: outcome.done,
                next_available,
                termination: outcome.termination,
            };
            self.agent.update(&transition);
            trace.transitions.push(transition);
            state = outcome.next_state;

            if outcome.done {
                trace.termination = outcome.termination;
                return Ok(trace);
            }
        }
    }

    /// Trains for up to `num_episodes` episodes, decaying epsilon once per
    /// episode.
    pub fn train<S: ProfileSampler + ?Sized>(
        &mut self,
        num_episodes: usize,
        sampler: &mut S,
    ) -> PlpResult<ConvergenceReport> {
        let started_at = Utc::now();
        info!(
            "🚀 Starting training run {} for {} episodes (epsilon {:.3})",
            self.run_id,
            num_episodes,
            self.agent.epsilon()
        );

        let mut tracker = ConvergenceTracker::new(self.config.convergence);
        let mut history = Vec::new();
        let mut goal_reached_episodes = 0;
        let mut step_limit_episodes = 0;
        let mut abandoned_episodes = 0;
        let mut invalid_actions = 0;
        let mut checkpoints_saved = 0;
        let mut checkpoint_failures = 0;
        let mut stopped_early = None;

        let pb = self.progress.create_episode_bar(num_episodes as u64);

        for episode in 0..num_episodes {
            if self.stop_flag.load(Ordering::Relaxed) {
                info!("Stop requested; ending training after {} episodes", episode);
                stopped_early = Some(StopReason::Requested);
                break;
            }

            let profile = sampler.sample(&mut self.rng);
            let trace = self.run_episode(&profile)?;
            let epsilon_used = self.agent.epsilon();
            self.agent.decay_epsilon(&self.config.epsilon);
            self.episodes_completed += 1;

            let total_reward = trace.total_reward();
            let trailing = tracker.record(total_reward);
            invalid_actions += trace.invalid_actions;
            match trace.termination {
                Some(TerminationReason::GoalReached) => goal_reached_episodes += 1,
                Some(TerminationReason::StepLimit) => step_limit_episodes += 1,
                None => abandoned_episodes += 1,
            }

            if episode % self.config.history_every == 0 {
                history.push(EpisodeSummary {
                    episode,
                    total_reward,
                    steps: trace.len(),
                    epsilon: epsilon_used,
                    termination: trace.termination,
                });
                debug!(
                    "Episode {}: reward {:.3}, {} steps, trailing avg {:.3}, epsilon {:.4}",
                    episode,
                    total_reward,
                    trace.len(),
                    trailing,
                    epsilon_used
                );
            }

            if let Some(every) = self.config.checkpoint_every {
                if (episode + 1) % every == 0 {
                    match self.checkpoint() {
                        Ok(true) => checkpoints_saved += 1,
                        Ok(false) => {}
                        Err(e) => {
                            checkpoint_failures += 1;
                            warn!("Checkpoint after episode {} failed: {}", episode + 1, e);
                        }
                    }
                }
            }

            if let Some(pb) = &pb {
                pb.inc(1);
                if self.progress.should_show_detailed()
                    && (episode + 1) % self.progress.message_every == 0
                {
                    pb.set_message(format!(
                        "avg reward {:.3} | epsilon {:.3}",
                        trailing,
                        self.agent.epsilon()
                    ));
                }
            }

            if self.config.convergence.stop_when_stable && tracker.is_stable() {
                info!(
                    "Training stable since episode {:?}; stopping early",
                    tracker.stable_since()
                );
                stopped_early = Some(StopReason::Stable);
                break;
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message("Training complete");
        }

        let report = ConvergenceReport {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            episodes_requested: num_episodes,
            episodes_run: tracker.episodes(),
            trailing_average_rewards: tracker.trailing_averages().to_vec(),
            final_epsilon: self.agent.epsilon(),
            stable: tracker.is_stable(),
            stable_since_episode: tracker.stable_since(),
            goal_reached_episodes,
            step_limit_episodes,
            abandoned_episodes,
            invalid_actions,
            checkpoints_saved,
            checkpoint_failures,
            stopped_early,
            history,
        };

        info!(
            "✅ Training run {} finished: {} episodes, {} goal / {} step-limit, final avg reward {:.3}, epsilon {:.4}, stable: {}",
            self.run_id,
            report.episodes_run,
            report.goal_reached_episodes,
            report.step_limit_episodes,
            report.final_trailing_average().unwrap_or(0.0),
            report.final_epsilon,
            report.stable
        );
        Ok(report)
    }

    fn metadata(&self) -> TableMetadata {
        TableMetadata {
            run_id: Some(self.run_id.to_string()),
            episodes_trained: self.episodes_completed,
            epsilon: self.agent.epsilon(),
        }
    }

    fn checkpoint(&self) -> PlpResult<bool> {
        match self.store {
            Some(store) => {
                store.save(self.agent.table(), &self.metadata())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Saves the current table to the attached store.
    pub fn save(&self) -> PlpResult<()> {
        let store = self
            .store
            .ok_or_else(|| PlpError::persistence("no table store attached to trainer", None))?;
        store.save(self.agent.table(), &self.metadata())
    }
}
