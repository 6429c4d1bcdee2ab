// src/rl/evaluation.rs
use log::info;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::agent::QLearningAgent;
use super::environment::{Environment, TerminationReason};
use super::path_projector::PathProjector;
use super::training::ProfileSampler;
use crate::errors::{PlpError, PlpResult};
use crate::models::intervention::InterventionId;
use crate::models::skill::{Skill, SKILL_COUNT};

/// Aggregate outcome of greedy roll-outs over many sampled students.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub simulations: usize,
    pub horizon: usize,
    pub mean_reward: f64,
    pub std_reward: f64,
    pub goal_rate: f64,
    pub mean_steps: f64,
    /// Mean mastery buckets gained per skill.
    pub mean_mastery_gain: BTreeMap<Skill, f64>,
    pub most_common_path: Vec<InterventionId>,
    /// Share of simulations that followed `most_common_path`.
    pub most_common_path_frequency: f64,
}

pub fn evaluate_policy<E, S>(
    agent: &QLearningAgent,
    env: &mut E,
    projector: &PathProjector,
    sampler: &mut S,
    rng: &mut StdRng,
    simulations: usize,
    horizon: usize,
) -> PlpResult<SimulationSummary>
where
    E: Environment + ?Sized,
    S: ProfileSampler + ?Sized,
{
    if simulations == 0 {
        return Err(PlpError::configuration("simulations must be at least 1"));
    }

    let mut rewards = Vec::with_capacity(simulations);
    let mut steps = 0usize;
    let mut goals = 0usize;
    let mut gains = [0.0f64; SKILL_COUNT];
    let mut path_counts: HashMap<Vec<InterventionId>, usize> = HashMap::new();

    for _ in 0..simulations {
        let profile = sampler.sample(rng);
        let path = projector.project(agent, &mut *env, &profile, horizon)?;

        rewards.push(path.total_realized_reward());
        steps += path.len();
        if path.termination == Some(TerminationReason::GoalReached) {
            goals += 1;
        }
        let start = path.initial_state;
        let end = path.final_state();
        for skill in Skill::ALL {
            gains[skill.index()] +=
                end.mastery_of(skill) as f64 - start.mastery_of(skill) as f64;
        }
        *path_counts.entry(path.interventions()).or_insert(0) += 1;
    }

    let n = simulations as f64;
    let mean_reward = rewards.iter().sum::<f64>() / n;
    let variance = rewards
        .iter()
        .map(|r| (r - mean_reward).powi(2))
        .sum::<f64>()
        / n;

    // ties resolved on the path itself so the summary is reproducible
    let (most_common_path, most_common_count) = path_counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
        .unwrap_or_default();

    let summary = SimulationSummary {
        simulations,
        horizon,
        mean_reward,
        std_reward: variance.sqrt(),
        goal_rate: goals as f64 / n,
        mean_steps: steps as f64 / n,
        mean_mastery_gain: Skill::ALL
            .iter()
            .map(|s| (*s, gains[s.index()] / n))
            .collect(),
        most_common_path,
        most_common_path_frequency: most_common_count as f64 / n,
    };

    info!(
        "Evaluated policy over {} simulations: mean reward {:.3} ± {:.3}, goal rate {:.1}%",
        simulations,
        summary.mean_reward,
        summary.std_reward,
        summary.goal_rate * 100.0
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::intervention::InterventionCatalogue;
    use crate::models::student_profile::{ProfileType, StudentProfile};
    use crate::rl::agent::AgentParams;
    use crate::rl::environment::{EnvironmentConfig, LearningEnvironment};
    use crate::rl::training::CloneSampler;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn setup() -> (LearningEnvironment, PathProjector, QLearningAgent) {
        let catalogue = Arc::new(InterventionCatalogue::standard());
        let env = LearningEnvironment::new(EnvironmentConfig::default(), Arc::clone(&catalogue), 4)
            .unwrap();
        let agent = QLearningAgent::new(AgentParams::default(), 0.0).unwrap();
        (env, PathProjector::new(catalogue), agent)
    }

    #[test]
    fn test_summary_over_fixed_profile() {
        let (mut env, projector, agent) = setup();
        let mut rng = StdRng::seed_from_u64(3);
        let mut sampler = |_: &mut StdRng| StudentProfile::sample(ProfileType::Average);
        let summary =
            evaluate_policy(&agent, &mut env, &projector, &mut sampler, &mut rng, 8, 6).unwrap();

        assert_eq!(summary.simulations, 8);
        assert!(summary.mean_steps <= 6.0);
        assert!(summary.std_reward >= 0.0);
        assert!((0.0..=1.0).contains(&summary.goal_rate));
        assert!(summary.mean_mastery_gain.values().all(|g| *g >= 0.0));
        assert!(summary.most_common_path_frequency > 0.0);
        assert!(summary.most_common_path.len() <= 6);
    }

    #[test]
    fn test_clone_sampler_evaluation() {
        let (mut env, projector, agent) = setup();
        let mut rng = StdRng::seed_from_u64(9);
        let mut sampler =
            CloneSampler::with_defaults(&StudentProfile::sample(ProfileType::Struggling), &mut rng);
        let summary =
            evaluate_policy(&agent, &mut env, &projector, &mut sampler, &mut rng, 5, 4).unwrap();
        assert_eq!(summary.mean_mastery_gain.len(), 4);
    }

    #[test]
    fn test_zero_simulations_rejected() {
        let (mut env, projector, agent) = setup();
        let mut rng = StdRng::seed_from_u64(0);
        let mut sampler = |_: &mut StdRng| StudentProfile::sample(ProfileType::Average);
        assert!(evaluate_policy(&agent, &mut env, &projector, &mut sampler, &mut rng, 0, 5).is_err());
    }
}
