// src/models/mod.rs
pub mod intervention;
pub mod skill;
pub mod state;
pub mod student_profile;

pub use intervention::{Intensity, Intervention, InterventionCatalogue, InterventionId, Strategy};
pub use skill::{Skill, SKILL_COUNT};
pub use state::{BucketConfig, StateSpace, StudentState};
pub use student_profile::{KolbStyle, ProfileType, StudentProfile};
