// src/rl/mod.rs
pub mod agent;
pub mod convergence;
pub mod environment;
pub mod evaluation;
pub mod feedback_processor;
pub mod path_projector;
pub mod persistence;
pub mod profile_encoder;
pub mod q_table;
pub mod reward;
pub mod training;

pub use agent::{AgentParams, EpsilonSchedule, QLearningAgent, Transition};
pub use convergence::{ConvergenceConfig, ConvergenceTracker};
pub use environment::{
    Environment, EnvironmentConfig, LearningEnvironment, StepOutcome, TerminationReason,
};
pub use evaluation::{evaluate_policy, SimulationSummary};
pub use feedback_processor::{process_feedback, FeedbackRecord, FeedbackStats};
pub use path_projector::{LearningPath, PathNode, PathProjector, PathStep};
pub use persistence::{load_or_create, JsonFileStore, LoadOutcome, MemoryStore, QTableStore, TableMetadata};
pub use profile_encoder::ProfileEncoder;
pub use q_table::{QTable, QTableRow};
pub use reward::{RewardModel, RewardWeights};
pub use training::{
    CloneSampler, ConvergenceReport, EpisodeTrace, ProfileSampler, StopReason, Trainer,
    TrainingConfig,
};
