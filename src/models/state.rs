// src/models/state.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use super::skill::{Skill, SKILL_COUNT};
use super::student_profile::KolbStyle;

pub const MIN_BUCKETS: u8 = 2;
pub const MAX_BUCKETS: u8 = 10;

/// Granularity of the discretized state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Levels for motivation, self-efficacy and aptitude.
    pub emotional_buckets: u8,
    /// Levels for each skill pillar's mastery.
    pub mastery_buckets: u8,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            emotional_buckets: 3,
            mastery_buckets: 5,
        }
    }
}

impl BucketConfig {
    /// Top emotional bucket; 0 for a degenerate config with no buckets.
    pub fn max_emotional(&self) -> u8 {
        self.emotional_buckets.saturating_sub(1)
    }

    pub fn max_mastery(&self) -> u8 {
        self.mastery_buckets.saturating_sub(1)
    }
}

/// Discretized snapshot of a student. Values are never mutated in place;
/// transitions build a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StudentState {
    pub motivation: u8,
    pub self_efficacy: u8,
    pub aptitude: u8,
    pub style: KolbStyle,
    pub mastery: [u8; SKILL_COUNT],
}

impl StudentState {
    pub fn mastery_of(&self, skill: Skill) -> u8 {
        self.mastery[skill.index()]
    }

    pub fn with_mastery(self, skill: Skill, level: u8) -> Self {
        let mut mastery = self.mastery;
        mastery[skill.index()] = level;
        Self { mastery, ..self }
    }

    pub fn with_emotions(self, motivation: u8, self_efficacy: u8) -> Self {
        Self {
            motivation,
            self_efficacy,
            ..self
        }
    }

    pub fn total_mastery(&self) -> u32 {
        self.mastery.iter().map(|m| *m as u32).sum()
    }

    /// Difference between the strongest and weakest pillar.
    pub fn mastery_spread(&self) -> u8 {
        let max = self.mastery.iter().copied().max().unwrap_or(0);
        let min = self.mastery.iter().copied().min().unwrap_or(0);
        max - min
    }

    pub fn all_mastered(&self, buckets: &BucketConfig) -> bool {
        self.mastery.iter().all(|m| *m >= buckets.max_mastery())
    }
}

impl fmt::Display for StudentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "m{}e{}a{}:{:?}|{}-{}-{}-{}",
            self.motivation,
            self.self_efficacy,
            self.aptitude,
            self.style,
            self.mastery[0],
            self.mastery[1],
            self.mastery[2],
            self.mastery[3]
        )
    }
}

/// The finite set of all states for a bucket configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSpace {
    pub buckets: BucketConfig,
}

impl StateSpace {
    pub fn new(buckets: BucketConfig) -> Self {
        Self { buckets }
    }

    pub fn size(&self) -> u64 {
        let e = self.buckets.emotional_buckets as u64;
        let m = self.buckets.mastery_buckets as u64;
        e.pow(3) * KolbStyle::ALL.len() as u64 * m.pow(SKILL_COUNT as u32)
    }

    pub fn contains(&self, state: &StudentState) -> bool {
        state.motivation < self.buckets.emotional_buckets
            && state.self_efficacy < self.buckets.emotional_buckets
            && state.aptitude < self.buckets.emotional_buckets
            && state.mastery.iter().all(|m| *m < self.buckets.mastery_buckets)
    }

    /// Enumerates every state in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = StudentState> + '_ {
        (0..self.size()).map(move |i| self.state_at(i))
    }

    fn state_at(&self, mut index: u64) -> StudentState {
        let e = self.buckets.emotional_buckets as u64;
        let m = self.buckets.mastery_buckets as u64;
        let mut mastery = [0u8; SKILL_COUNT];
        for level in mastery.iter_mut().rev() {
            *level = (index % m) as u8;
            index /= m;
        }
        let style = KolbStyle::ALL[(index % 4) as usize];
        index /= 4;
        let aptitude = (index % e) as u8;
        index /= e;
        let self_efficacy = (index % e) as u8;
        index /= e;
        let motivation = (index % e) as u8;
        StudentState {
            motivation,
            self_efficacy,
            aptitude,
            style,
            mastery,
        }
    }
}
