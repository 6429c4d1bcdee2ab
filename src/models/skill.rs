// src/models/skill.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SKILL_COUNT: usize = 4;

/// The four basic-skill pillars of the EU key competences framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Literacy,
    Numeracy,
    Digital,
    Citizenship,
}

impl Skill {
    pub const ALL: [Skill; SKILL_COUNT] = [
        Skill::Literacy,
        Skill::Numeracy,
        Skill::Digital,
        Skill::Citizenship,
    ];

    /// Position of the pillar inside a mastery vector.
    pub fn index(self) -> usize {
        match self {
            Skill::Literacy => 0,
            Skill::Numeracy => 1,
            Skill::Digital => 2,
            Skill::Citizenship => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Literacy => "literacy",
            Skill::Numeracy => "numeracy",
            Skill::Digital => "digital",
            Skill::Citizenship => "citizenship",
        }
    }

    /// Display colour used by the tree visualization layer.
    pub fn color(&self) -> &'static str {
        match self {
            Skill::Literacy => "#4CAF50",
            Skill::Numeracy => "#2196F3",
            Skill::Digital => "#9C27B0",
            Skill::Citizenship => "#FF9800",
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Skill {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "literacy" => Ok(Skill::Literacy),
            "numeracy" => Ok(Skill::Numeracy),
            "digital" => Ok(Skill::Digital),
            "citizenship" => Ok(Skill::Citizenship),
            other => Err(format!("unknown skill '{}'", other)),
        }
    }
}
