// src/rl/profile_encoder.rs
use log::{debug, warn};
use serde::Serialize;

use crate::models::skill::{Skill, SKILL_COUNT};
use crate::models::state::{BucketConfig, StudentState};
use crate::models::student_profile::{KolbStyle, StudentProfile};

const SCORE_MAX: f64 = 100.0;
const DEFAULT_STYLE: KolbStyle = KolbStyle::Assimilator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DomainIssueKind {
    /// Value absent or not a finite number; the field's default bucket was used.
    Missing,
    /// Value outside its declared range; clamped to the nearest bucket.
    Clamped,
}

/// Data-quality note produced while encoding a profile.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainIssue {
    pub field: String,
    pub value: Option<f64>,
    pub kind: DomainIssueKind,
}

/// Maps raw profiles onto the bucketed state space. Pure: the same profile
/// always yields the same state.
#[derive(Debug, Clone, Copy)]
pub struct ProfileEncoder {
    buckets: BucketConfig,
}

impl ProfileEncoder {
    pub fn new(buckets: BucketConfig) -> Self {
        Self { buckets }
    }

    pub fn buckets(&self) -> BucketConfig {
        self.buckets
    }

    /// Encodes a profile, logging every out-of-domain or missing measurement.
    pub fn encode(&self, profile: &StudentProfile) -> StudentState {
        let (state, issues) = self.encode_with_issues(profile);
        for issue in &issues {
            match issue.kind {
                DomainIssueKind::Clamped => warn!(
                    "Profile {}: field '{}' value {:?} outside its domain, clamped to nearest bucket",
                    profile.id, issue.field, issue.value
                ),
                DomainIssueKind::Missing => warn!(
                    "Profile {}: field '{}' missing or invalid, using default bucket",
                    profile.id, issue.field
                ),
            }
        }
        debug!("Encoded profile {} as state {}", profile.id, state);
        state
    }

    /// Encodes a profile and returns the data-quality issues instead of logging them.
    pub fn encode_with_issues(&self, profile: &StudentProfile) -> (StudentState, Vec<DomainIssue>) {
        let mut issues = Vec::new();
        let emotional = self.buckets.emotional_buckets;
        let mastery_buckets = self.buckets.mastery_buckets;
        let emotional_default = self.buckets.max_emotional() / 2;

        let motivation = bucketize(
            "emotional.intrinsic_motivation",
            Some(profile.emotional.intrinsic_motivation),
            SCORE_MAX,
            emotional,
            emotional_default,
            &mut issues,
        );
        let self_efficacy = bucketize(
            "emotional.self_efficacy",
            Some(profile.emotional.self_efficacy),
            SCORE_MAX,
            emotional,
            emotional_default,
            &mut issues,
        );

        let cognitive = &profile.cognitive;
        let aptitude_inputs: Vec<f64> = [cognitive.conceptual_mastery, cognitive.reasoning_logic]
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        let aptitude_value = if aptitude_inputs.is_empty() {
            None
        } else {
            Some(aptitude_inputs.iter().sum::<f64>() / aptitude_inputs.len() as f64)
        };
        let aptitude = bucketize(
            "cognitive.aptitude",
            aptitude_value,
            SCORE_MAX,
            emotional,
            emotional_default,
            &mut issues,
        );

        let style = cognitive.kolb_style.unwrap_or_else(|| {
            issues.push(DomainIssue {
                field: "cognitive.kolb_style".to_string(),
                value: None,
                kind: DomainIssueKind::Missing,
            });
            DEFAULT_STYLE
        });

        let mut mastery = [0u8; SKILL_COUNT];
        for skill in Skill::ALL {
            let raw = match cognitive.prior_knowledge.get(&skill) {
                Some(score) => Some(*score),
                // Digital competence (V4) stands in for missing digital prior knowledge.
                None if skill == Skill::Digital => Some(profile.demographics.digital_competence_score),
                None => None,
            };
            mastery[skill.index()] = bucketize(
                &format!("cognitive.prior_knowledge.{}", skill),
                raw,
                SCORE_MAX,
                mastery_buckets,
                0,
                &mut issues,
            );
        }

        let state = StudentState {
            motivation,
            self_efficacy,
            aptitude,
            style,
            mastery,
        };
        (state, issues)
    }
}

/// Maps a value in `[0, max]` onto `0..buckets`. Missing values take
/// `default`; out-of-range values clamp to the nearest end.
fn bucketize(
    field: &str,
    value: Option<f64>,
    max: f64,
    buckets: u8,
    default: u8,
    issues: &mut Vec<DomainIssue>,
) -> u8 {
    let top = buckets.saturating_sub(1);
    let value = match value {
        Some(v) if v.is_finite() => v,
        other => {
            issues.push(DomainIssue {
                field: field.to_string(),
                value: other,
                kind: DomainIssueKind::Missing,
            });
            return default.min(top);
        }
    };

    if value < 0.0 || value > max {
        issues.push(DomainIssue {
            field: field.to_string(),
            value: Some(value),
            kind: DomainIssueKind::Clamped,
        });
    }
    let fraction = value.clamp(0.0, max) / max;
    ((fraction * buckets as f64).floor() as u8).min(top)
}
