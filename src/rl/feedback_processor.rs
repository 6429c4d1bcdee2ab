// src/rl/feedback_processor.rs
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::agent::{QLearningAgent, Transition};
use super::environment::{EnvironmentConfig, TerminationReason};
use super::profile_encoder::ProfileEncoder;
use super::reward::RewardModel;
use crate::models::intervention::{InterventionCatalogue, InterventionId};
use crate::models::student_profile::StudentProfile;

/// An intervention observed in the classroom: the student's profile before
/// it, the intervention applied, and the profile measured afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub profile_before: StudentProfile,
    pub intervention_id: InterventionId,
    pub profile_after: StudentProfile,
    #[serde(default)]
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackStats {
    pub processed: usize,
    pub skipped: usize,
}

/// Replays observed feedback as Q-learning transitions, scored by the same
/// reward model the simulator uses.
pub fn process_feedback(
    agent: &mut QLearningAgent,
    env_config: &EnvironmentConfig,
    catalogue: &InterventionCatalogue,
    records: &[FeedbackRecord],
) -> FeedbackStats {
    info!("Starting feedback replay cycle for {} records", records.len());
    let mut stats = FeedbackStats::default();

    if records.is_empty() {
        info!("No feedback to process.");
        return stats;
    }

    let encoder = ProfileEncoder::new(env_config.buckets);
    let reward_model = RewardModel::new(env_config.reward_weights, env_config.buckets);
    let top = env_config.buckets.max_mastery();

    for record in records {
        let Some(intervention) = catalogue.get(record.intervention_id) else {
            warn!(
                "Feedback for {} names unknown intervention {}. Skipping.",
                record.profile_before.id, record.intervention_id
            );
            stats.skipped += 1;
            continue;
        };

        let state = encoder.encode(&record.profile_before);
        if state.mastery_of(intervention.skill) >= top {
            warn!(
                "Feedback for {}: {} targets a skill already at the top bucket. Skipping.",
                record.profile_before.id, intervention
            );
            stats.skipped += 1;
            continue;
        }

        let next_state = encoder.encode(&record.profile_after);
        let reward = reward_model.score(&state, intervention, &next_state).total();
        let done = next_state.all_mastered(&env_config.buckets);
        let next_available = if done {
            Vec::new()
        } else {
            catalogue
                .iter()
                .filter(|i| next_state.mastery_of(i.skill) < top)
                .map(|i| i.id)
                .collect()
        };

        let new_value = agent.update(&Transition {
            state,
            action: intervention.id,
            reward,
            next_state,
            done,
            next_available,
            termination: done.then_some(TerminationReason::GoalReached),
        });
        debug!(
            "Feedback for {}: {} -> {} via {}, reward {:.3}, Q now {:.3}",
            record.profile_before.id, state, next_state, intervention, reward, new_value
        );
        stats.processed += 1;
    }

    info!(
        "Feedback processing complete. Processed: {}, Skipped: {}.",
        stats.processed, stats.skipped
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::skill::Skill;
    use crate::models::student_profile::ProfileType;
    use crate::rl::agent::AgentParams;

    fn record(intervention_id: InterventionId, literacy_after: f64) -> FeedbackRecord {
        let before = StudentProfile::sample(ProfileType::Struggling);
        let mut after = before.clone();
        after
            .cognitive
            .prior_knowledge
            .insert(Skill::Literacy, literacy_after);
        FeedbackRecord {
            profile_before: before,
            intervention_id,
            profile_after: after,
            recorded_at: None,
        }
    }

    #[test]
    fn test_feedback_updates_agent_and_counts() {
        let mut agent = QLearningAgent::new(AgentParams::default(), 0.0).unwrap();
        let catalogue = InterventionCatalogue::standard();
        let config = EnvironmentConfig::default();
        let records = vec![record(1, 35.0), record(9_999, 55.0), record(0, 55.0)];

        let stats = process_feedback(&mut agent, &config, &catalogue, &records);
        assert_eq!(stats, FeedbackStats { processed: 2, skipped: 1 });
        assert_eq!(agent.updates(), 2);

        let state = ProfileEncoder::new(config.buckets).encode(&records[2].profile_before);
        // literacy gained one bucket: positive reward pulls Q above zero
        assert!(agent.estimate(&state, 0) > 0.0);
        // no gain, only costs: Q goes negative
        assert!(agent.estimate(&state, 1) < 0.0);
    }

    #[test]
    fn test_masked_feedback_is_skipped() {
        let mut agent = QLearningAgent::new(AgentParams::default(), 0.0).unwrap();
        let mut rec = record(0, 100.0);
        rec.profile_before
            .cognitive
            .prior_knowledge
            .insert(Skill::Literacy, 100.0);
        let stats = process_feedback(
            &mut agent,
            &EnvironmentConfig::default(),
            &InterventionCatalogue::standard(),
            &[rec],
        );
        assert_eq!(stats.skipped, 1);
        assert_eq!(agent.updates(), 0);
    }

    #[test]
    fn test_empty_feedback_is_a_no_op() {
        let mut agent = QLearningAgent::new(AgentParams::default(), 0.0).unwrap();
        let stats = process_feedback(
            &mut agent,
            &EnvironmentConfig::default(),
            &InterventionCatalogue::standard(),
            &[],
        );
        assert_eq!(stats, FeedbackStats::default());
    }
}
