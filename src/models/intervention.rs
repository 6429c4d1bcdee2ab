// src/models/intervention.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::skill::Skill;
use super::student_profile::KolbStyle;
use crate::errors::{PlpError, PlpResult};

/// Dense index into an [`InterventionCatalogue`]. The numeric order is the
/// tie-break order for greedy selection.
pub type InterventionId = u16;

/// High-impact teaching strategies (V13/V14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    InquiryBased,
    FormativeFeedback,
    DirectInstruction,
    RetrievalPractice,
    ProblemBased,
    Scaffolding,
    Gamification,
    ProjectBased,
}

impl Strategy {
    pub const ALL: [Strategy; 8] = [
        Strategy::InquiryBased,
        Strategy::FormativeFeedback,
        Strategy::DirectInstruction,
        Strategy::RetrievalPractice,
        Strategy::ProblemBased,
        Strategy::Scaffolding,
        Strategy::Gamification,
        Strategy::ProjectBased,
    ];

    pub fn preferred_style(&self) -> KolbStyle {
        match self {
            Strategy::InquiryBased | Strategy::FormativeFeedback => KolbStyle::Divergent,
            Strategy::DirectInstruction | Strategy::RetrievalPractice => KolbStyle::Assimilator,
            Strategy::ProblemBased | Strategy::Scaffolding => KolbStyle::Convergent,
            Strategy::Gamification | Strategy::ProjectBased => KolbStyle::Accommodator,
        }
    }

    /// Style fit in [0, 1]: 1 on an exact match, 0.5 when one Kolb axis is
    /// shared, 0 for the opposite style.
    pub fn fit(&self, style: KolbStyle) -> f64 {
        self.preferred_style().shared_axes(style) as f64 / 2.0
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::InquiryBased => "inquiry_based",
            Strategy::FormativeFeedback => "formative_feedback",
            Strategy::DirectInstruction => "direct_instruction",
            Strategy::RetrievalPractice => "retrieval_practice",
            Strategy::ProblemBased => "problem_based",
            Strategy::Scaffolding => "scaffolding",
            Strategy::Gamification => "gamification",
            Strategy::ProjectBased => "project_based",
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Strategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == wanted)
            .ok_or_else(|| format!("unknown strategy '{}'", s.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Light,
    Standard,
    Intensive,
}

impl Intensity {
    pub const ALL: [Intensity; 3] = [Intensity::Light, Intensity::Standard, Intensity::Intensive];

    /// Scales the growth probability of the targeted skill.
    pub fn growth_multiplier(&self) -> f64 {
        match self {
            Intensity::Light => 0.6,
            Intensity::Standard => 1.0,
            Intensity::Intensive => 1.4,
        }
    }

    /// Effort cost charged by the reward model.
    pub fn effort(&self) -> f64 {
        match self {
            Intensity::Light => 0.25,
            Intensity::Standard => 0.5,
            Intensity::Intensive => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intensity::Light => "light",
            Intensity::Standard => "standard",
            Intensity::Intensive => "intensive",
        }
    }
}

impl FromStr for Intensity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Intensity::Light),
            "standard" => Ok(Intensity::Standard),
            "intensive" => Ok(Intensity::Intensive),
            other => Err(format!("unknown intensity '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Intervention {
    pub id: InterventionId,
    pub strategy: Strategy,
    pub skill: Skill,
    pub intensity: Intensity,
}

impl fmt::Display for Intervention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} on {} ({})",
            self.id,
            self.strategy.as_str(),
            self.skill,
            self.intensity.as_str()
        )
    }
}

fn combinations(strategies: &[Strategy], intensities: &[Intensity]) -> Vec<Intervention> {
    let mut interventions = Vec::new();
    for strategy in Strategy::ALL.iter().filter(|s| strategies.contains(s)) {
        for skill in Skill::ALL {
            for intensity in Intensity::ALL.iter().filter(|i| intensities.contains(i)) {
                interventions.push(Intervention {
                    id: interventions.len() as InterventionId,
                    strategy: *strategy,
                    skill,
                    intensity: *intensity,
                });
            }
        }
    }
    interventions
}

/// Fixed, ordered set of interventions for one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionCatalogue {
    interventions: Vec<Intervention>,
}

impl InterventionCatalogue {
    /// Every strategy x skill x intensity combination.
    pub fn standard() -> Self {
        Self {
            interventions: combinations(&Strategy::ALL, &Intensity::ALL),
        }
    }

    /// Catalogue restricted to the given strategies and intensities, in their
    /// canonical order.
    pub fn build(strategies: &[Strategy], intensities: &[Intensity]) -> PlpResult<Self> {
        Self::from_interventions(combinations(strategies, intensities))
    }

    /// Accepts a custom list. Ids must be exactly `0..len` in order, and no two
    /// entries may describe the same (strategy, skill, intensity).
    pub fn from_interventions(interventions: Vec<Intervention>) -> PlpResult<Self> {
        if interventions.is_empty() {
            return Err(PlpError::configuration("intervention catalogue is empty"));
        }
        if interventions.len() > InterventionId::MAX as usize {
            return Err(PlpError::configuration(format!(
                "intervention catalogue has {} entries, more than the supported {}",
                interventions.len(),
                InterventionId::MAX
            )));
        }
        let mut seen = HashSet::new();
        for (position, intervention) in interventions.iter().enumerate() {
            if intervention.id as usize != position {
                return Err(PlpError::configuration(format!(
                    "intervention at position {} has id {}",
                    position, intervention.id
                )));
            }
            if !seen.insert((intervention.strategy, intervention.skill, intervention.intensity)) {
                return Err(PlpError::configuration(format!(
                    "duplicate intervention {}",
                    intervention
                )));
            }
        }
        Ok(Self { interventions })
    }

    pub fn len(&self) -> usize {
        self.interventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interventions.is_empty()
    }

    pub fn get(&self, id: InterventionId) -> Option<&Intervention> {
        self.interventions.get(id as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Intervention> {
        self.interventions.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = InterventionId> + '_ {
        self.interventions.iter().map(|i| i.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalogue_has_dense_ids() {
        let catalogue = InterventionCatalogue::standard();
        assert_eq!(catalogue.len(), 8 * 4 * 3);
        for (i, intervention) in catalogue.iter().enumerate() {
            assert_eq!(intervention.id as usize, i);
        }
        assert!(catalogue.get(catalogue.len() as InterventionId).is_none());
    }

    #[test]
    fn test_restricted_catalogue_keeps_canonical_order() {
        let catalogue = InterventionCatalogue::build(
            &[Strategy::Gamification, Strategy::DirectInstruction],
            &[Intensity::Standard],
        )
        .unwrap();
        assert_eq!(catalogue.len(), 8);
        assert_eq!(catalogue.get(0).unwrap().strategy, Strategy::DirectInstruction);
        assert_eq!(catalogue.get(4).unwrap().strategy, Strategy::Gamification);
    }

    #[test]
    fn test_empty_or_malformed_catalogue_is_rejected() {
        assert!(InterventionCatalogue::build(&[], &Intensity::ALL).is_err());

        let bad = vec![Intervention {
            id: 3,
            strategy: Strategy::Scaffolding,
            skill: Skill::Numeracy,
            intensity: Intensity::Light,
        }];
        assert!(InterventionCatalogue::from_interventions(bad).is_err());
    }

    #[test]
    fn test_strategy_fit() {
        assert_eq!(Strategy::ProblemBased.fit(KolbStyle::Convergent), 1.0);
        assert_eq!(Strategy::ProblemBased.fit(KolbStyle::Assimilator), 0.5);
        assert_eq!(Strategy::ProblemBased.fit(KolbStyle::Divergent), 0.0);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("retrieval-practice".parse::<Strategy>().unwrap(), Strategy::RetrievalPractice);
        assert!("lecturing".parse::<Strategy>().is_err());
    }
}
