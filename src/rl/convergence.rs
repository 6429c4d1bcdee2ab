// src/rl/convergence.rs
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::errors::{PlpError, PlpResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceConfig {
    /// Episodes per trailing window.
    pub window: usize,
    /// Maximum change between consecutive window averages that counts as flat.
    pub tolerance: f64,
    /// Consecutive flat windows needed before training is reported stable.
    pub patience: usize,
    /// End training as soon as it is stable. Off by default: stability is a
    /// diagnostic signal.
    pub stop_when_stable: bool,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            window: 50,
            tolerance: 0.05,
            patience: 3,
            stop_when_stable: false,
        }
    }
}

impl ConvergenceConfig {
    pub fn validate(&self) -> PlpResult<()> {
        if self.window == 0 {
            return Err(PlpError::configuration("convergence window must be at least 1"));
        }
        if self.patience == 0 {
            return Err(PlpError::configuration("convergence patience must be at least 1"));
        }
        if !(self.tolerance >= 0.0 && self.tolerance.is_finite()) {
            return Err(PlpError::configuration(format!(
                "convergence tolerance must be a non-negative number, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Running average of per-episode reward over a trailing window.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    config: ConvergenceConfig,
    recent: VecDeque<f64>,
    recent_sum: f64,
    episodes: usize,
    trailing_averages: Vec<f64>,
    previous_window_average: Option<f64>,
    flat_windows: usize,
    stable_since: Option<usize>,
}

impl ConvergenceTracker {
    pub fn new(config: ConvergenceConfig) -> Self {
        Self {
            config,
            recent: VecDeque::with_capacity(config.window),
            recent_sum: 0.0,
            episodes: 0,
            trailing_averages: Vec::new(),
            previous_window_average: None,
            flat_windows: 0,
            stable_since: None,
        }
    }

    /// Records one episode's total reward and returns the trailing average.
    /// Stability is re-evaluated each time a full window completes.
    pub fn record(&mut self, episode_reward: f64) -> f64 {
        self.episodes += 1;
        self.recent.push_back(episode_reward);
        self.recent_sum += episode_reward;
        if self.recent.len() > self.config.window {
            if let Some(old) = self.recent.pop_front() {
                self.recent_sum -= old;
            }
        }
        let average = self.recent_sum / self.recent.len() as f64;
        self.trailing_averages.push(average);

        if self.episodes % self.config.window == 0 {
            if let Some(previous) = self.previous_window_average {
                if (average - previous).abs() <= self.config.tolerance {
                    self.flat_windows += 1;
                } else {
                    self.flat_windows = 0;
                    self.stable_since = None;
                }
                if self.flat_windows >= self.config.patience && self.stable_since.is_none() {
                    self.stable_since = Some(self.episodes);
                }
            }
            self.previous_window_average = Some(average);
        }
        average
    }

    pub fn is_stable(&self) -> bool {
        self.stable_since.is_some()
    }

    /// Episode count at which the current stable stretch began.
    pub fn stable_since(&self) -> Option<usize> {
        self.stable_since
    }

    pub fn trailing_averages(&self) -> &[f64] {
        &self.trailing_averages
    }

    pub fn latest_average(&self) -> Option<f64> {
        self.trailing_averages.last().copied()
    }

    pub fn episodes(&self) -> usize {
        self.episodes
    }
}
