// src/models/student_profile.rs
//! Student profile record based on the AGORA input variables (V1-V12).
//!
//! Profiles arrive from the profile-management layer as JSON snapshots and may
//! be partial; the encoder decides how missing or out-of-range measurements
//! degrade.

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::skill::Skill;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EducationStage {
    #[serde(rename = "ESO")]
    Eso,
    #[serde(rename = "Bachillerato")]
    Bachillerato,
    #[serde(rename = "FP Basica")]
    FpBasica,
    #[serde(rename = "FP Grado Medio")]
    FpMedio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "Mujer")]
    Female,
    #[serde(rename = "Hombre")]
    Male,
    #[serde(rename = "No binario")]
    NonBinary,
    #[serde(rename = "Otro")]
    Other,
}

/// Kolb experiential learning style (V8).
///
/// Each style sits on two axes: concrete/abstract perception and
/// reflective/active processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KolbStyle {
    Divergent,
    Assimilator,
    Convergent,
    Accommodator,
}

impl KolbStyle {
    pub const ALL: [KolbStyle; 4] = [
        KolbStyle::Divergent,
        KolbStyle::Assimilator,
        KolbStyle::Convergent,
        KolbStyle::Accommodator,
    ];

    pub fn index(self) -> usize {
        match self {
            KolbStyle::Divergent => 0,
            KolbStyle::Assimilator => 1,
            KolbStyle::Convergent => 2,
            KolbStyle::Accommodator => 3,
        }
    }

    fn abstract_perception(self) -> bool {
        matches!(self, KolbStyle::Assimilator | KolbStyle::Convergent)
    }

    fn active_processing(self) -> bool {
        matches!(self, KolbStyle::Convergent | KolbStyle::Accommodator)
    }

    /// Number of Kolb axes (0..=2) on which two styles agree.
    pub fn shared_axes(self, other: KolbStyle) -> u8 {
        (self.abstract_perception() == other.abstract_perception()) as u8
            + (self.active_processing() == other.active_processing()) as u8
    }
}

/// Absent or `null` measurements deserialize as NaN, which the encoder
/// treats as missing.
fn missing_score() -> f64 {
    f64::NAN
}

fn score_or_missing<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemographicVariables {
    pub age: u32,
    pub education_stage: EducationStage,
    pub gender: Gender,
    /// DigComp 2.2 based score, 0-100.
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub digital_competence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionalFactors {
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub intrinsic_motivation: f64,
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub self_efficacy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveFactors {
    #[serde(default)]
    pub kolb_style: Option<KolbStyle>,
    /// Prior knowledge per pillar, 0-100. Pillars may be missing.
    #[serde(default)]
    pub prior_knowledge: BTreeMap<Skill, f64>,
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub conceptual_mastery: f64,
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub reasoning_logic: f64,
    /// Discrepancy index between self-assessment and performance, 0-1.
    #[serde(default = "missing_score", deserialize_with = "score_or_missing")]
    pub metacognitive_accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub id: String,
    pub name: String,
    pub demographics: DemographicVariables,
    pub emotional: EmotionalFactors,
    pub cognitive: CognitiveFactors,
}

/// Archetypes used for demos and simulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileType {
    HighPerformer,
    Average,
    Struggling,
}

impl FromStr for ProfileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "high_performer" => Ok(ProfileType::HighPerformer),
            "average" => Ok(ProfileType::Average),
            "struggling" => Ok(ProfileType::Struggling),
            other => Err(format!(
                "unknown profile type '{}' (expected high_performer, average or struggling)",
                other
            )),
        }
    }
}

impl fmt::Display for ProfileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileType::HighPerformer => "high_performer",
            ProfileType::Average => "average",
            ProfileType::Struggling => "struggling",
        };
        f.write_str(name)
    }
}

fn knowledge(literacy: f64, numeracy: f64, digital: f64, citizenship: f64) -> BTreeMap<Skill, f64> {
    [
        (Skill::Literacy, literacy),
        (Skill::Numeracy, numeracy),
        (Skill::Digital, digital),
        (Skill::Citizenship, citizenship),
    ]
    .into_iter()
    .collect()
}

impl StudentProfile {
    pub fn sample(profile_type: ProfileType) -> Self {
        let (demographics, emotional, cognitive) = match profile_type {
            ProfileType::HighPerformer => (
                DemographicVariables {
                    age: 16,
                    education_stage: EducationStage::Eso,
                    gender: Gender::Female,
                    digital_competence_score: 85.0,
                },
                EmotionalFactors {
                    intrinsic_motivation: 90.0,
                    self_efficacy: 85.0,
                },
                CognitiveFactors {
                    kolb_style: Some(KolbStyle::Assimilator),
                    prior_knowledge: knowledge(80.0, 85.0, 90.0, 75.0),
                    conceptual_mastery: 85.0,
                    reasoning_logic: 88.0,
                    metacognitive_accuracy: 0.1,
                },
            ),
            ProfileType::Struggling => (
                DemographicVariables {
                    age: 15,
                    education_stage: EducationStage::Eso,
                    gender: Gender::Male,
                    digital_competence_score: 45.0,
                },
                EmotionalFactors {
                    intrinsic_motivation: 40.0,
                    self_efficacy: 35.0,
                },
                CognitiveFactors {
                    kolb_style: Some(KolbStyle::Accommodator),
                    prior_knowledge: knowledge(35.0, 30.0, 50.0, 40.0),
                    conceptual_mastery: 40.0,
                    reasoning_logic: 35.0,
                    metacognitive_accuracy: 0.4,
                },
            ),
            ProfileType::Average => (
                DemographicVariables {
                    age: 16,
                    education_stage: EducationStage::Bachillerato,
                    gender: Gender::NonBinary,
                    digital_competence_score: 65.0,
                },
                EmotionalFactors {
                    intrinsic_motivation: 60.0,
                    self_efficacy: 55.0,
                },
                CognitiveFactors {
                    kolb_style: Some(KolbStyle::Convergent),
                    prior_knowledge: knowledge(55.0, 50.0, 70.0, 60.0),
                    conceptual_mastery: 58.0,
                    reasoning_logic: 55.0,
                    metacognitive_accuracy: 0.25,
                },
            ),
        };

        Self {
            id: format!("sample_{}", profile_type),
            name: format!("Sample Student ({})", profile_type),
            demographics,
            emotional,
            cognitive,
        }
    }

    /// Creates a simulated student near this one. Every continuous measurement
    /// moves by up to `variation` of its domain width and is clamped back into
    /// the domain; categorical fields are copied. Missing (non-finite) values
    /// stay missing.
    pub fn virtual_clone<R: Rng + ?Sized>(&self, variation: f64, rng: &mut R) -> StudentProfile {
        let variation = variation.abs();
        let mut vary = |value: f64, max_val: f64| -> f64 {
            if !value.is_finite() || variation == 0.0 {
                return value;
            }
            let delta = rng.gen_range(-1.0..=1.0) * variation * max_val;
            (value + delta).clamp(0.0, max_val)
        };

        let demographics = DemographicVariables {
            digital_competence_score: vary(self.demographics.digital_competence_score, 100.0),
            ..self.demographics.clone()
        };
        let emotional = EmotionalFactors {
            intrinsic_motivation: vary(self.emotional.intrinsic_motivation, 100.0),
            self_efficacy: vary(self.emotional.self_efficacy, 100.0),
        };
        let prior_knowledge = self
            .cognitive
            .prior_knowledge
            .iter()
            .map(|(skill, score)| (*skill, vary(*score, 100.0)))
            .collect();
        let cognitive = CognitiveFactors {
            kolb_style: self.cognitive.kolb_style,
            prior_knowledge,
            conceptual_mastery: vary(self.cognitive.conceptual_mastery, 100.0),
            reasoning_logic: vary(self.cognitive.reasoning_logic, 100.0),
            metacognitive_accuracy: vary(self.cognitive.metacognitive_accuracy, 1.0),
        };

        StudentProfile {
            id: format!("clone_{}_{:08x}", self.id, rng.gen::<u32>()),
            name: format!("Clone of {}", self.name),
            demographics,
            emotional,
            cognitive,
        }
    }

    /// Same profile with every pillar's prior knowledge set to `score`.
    pub fn with_uniform_knowledge(mut self, score: f64) -> Self {
        self.cognitive.prior_knowledge = Skill::ALL.iter().map(|s| (*s, score)).collect();
        self.demographics.digital_competence_score = score;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_shared_axes() {
        assert_eq!(KolbStyle::Divergent.shared_axes(KolbStyle::Divergent), 2);
        assert_eq!(KolbStyle::Divergent.shared_axes(KolbStyle::Assimilator), 1);
        assert_eq!(KolbStyle::Divergent.shared_axes(KolbStyle::Accommodator), 1);
        assert_eq!(KolbStyle::Divergent.shared_axes(KolbStyle::Convergent), 0);
        assert_eq!(KolbStyle::Assimilator.shared_axes(KolbStyle::Accommodator), 0);
    }

    #[test]
    fn test_virtual_clone_stays_in_domain() {
        let base = StudentProfile::sample(ProfileType::HighPerformer);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let clone = base.virtual_clone(0.5, &mut rng);
            assert!((0.0..=100.0).contains(&clone.emotional.intrinsic_motivation));
            assert!((0.0..=1.0).contains(&clone.cognitive.metacognitive_accuracy));
            for score in clone.cognitive.prior_knowledge.values() {
                assert!((0.0..=100.0).contains(score));
            }
            assert_eq!(clone.cognitive.kolb_style, base.cognitive.kolb_style);
            assert!(clone.id.starts_with("clone_sample_high_performer_"));
        }
    }

    #[test]
    fn test_virtual_clone_is_reproducible_with_seed() {
        let base = StudentProfile::sample(ProfileType::Average);
        let a = base.virtual_clone(0.15, &mut StdRng::seed_from_u64(11));
        let b = base.virtual_clone(0.15, &mut StdRng::seed_from_u64(11));
        assert_eq!(a, b);
    }

    #[test]
    fn test_profile_json_accepts_missing_optional_fields() {
        let json = r#"{
            "id": "s1", "name": "Ana",
            "demographics": {"age": 15, "education_stage": "ESO", "gender": "Mujer", "digital_competence_score": 40.0},
            "emotional": {"intrinsic_motivation": 50.0, "self_efficacy": 50.0},
            "cognitive": {"conceptual_mastery": 50.0, "reasoning_logic": 50.0, "metacognitive_accuracy": 0.2}
        }"#;
        let profile: StudentProfile = serde_json::from_str(json).unwrap();
        assert!(profile.cognitive.kolb_style.is_none());
        assert!(profile.cognitive.prior_knowledge.is_empty());
    }

    #[test]
    fn test_absent_or_null_scores_read_as_missing() {
        let json = r#"{
            "id": "s2", "name": "Leo",
            "demographics": {"age": 16, "education_stage": "ESO", "gender": "Hombre"},
            "emotional": {"intrinsic_motivation": null, "self_efficacy": 70.0},
            "cognitive": {"kolb_style": "Convergent", "reasoning_logic": 60.0, "metacognitive_accuracy": 0.3}
        }"#;
        let profile: StudentProfile = serde_json::from_str(json).unwrap();
        assert!(profile.demographics.digital_competence_score.is_nan());
        assert!(profile.emotional.intrinsic_motivation.is_nan());
        assert!(profile.cognitive.conceptual_mastery.is_nan());
        assert_eq!(profile.emotional.self_efficacy, 70.0);
    }

    #[test]
    fn test_profile_type_parsing() {
        assert_eq!("high-performer".parse::<ProfileType>().unwrap(), ProfileType::HighPerformer);
        assert_eq!("Struggling".parse::<ProfileType>().unwrap(), ProfileType::Struggling);
        assert!("genius".parse::<ProfileType>().is_err());
    }
}
