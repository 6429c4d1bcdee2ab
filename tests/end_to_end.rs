// tests/end_to_end.rs
use rand::rngs::StdRng;
use std::sync::Arc;

use plp_lib::models::intervention::InterventionCatalogue;
use plp_lib::models::skill::Skill;
use plp_lib::models::student_profile::{ProfileType, StudentProfile};
use plp_lib::rl::agent::{AgentParams, QLearningAgent};
use plp_lib::rl::environment::{Environment, EnvironmentConfig, LearningEnvironment};
use plp_lib::rl::path_projector::PathProjector;
use plp_lib::rl::persistence::{load_or_create, JsonFileStore, LoadOutcome, QTableStore};
use plp_lib::rl::training::{Trainer, TrainingConfig};
use plp_lib::rl::EpsilonSchedule;

fn beginner() -> StudentProfile {
    StudentProfile::sample(ProfileType::Struggling).with_uniform_knowledge(0.0)
}

fn environment(seed: u64, catalogue: &Arc<InterventionCatalogue>) -> LearningEnvironment {
    LearningEnvironment::new(
        EnvironmentConfig {
            max_steps: 40,
            ..EnvironmentConfig::default()
        },
        Arc::clone(catalogue),
        seed,
    )
    .unwrap()
}

fn train(seed: u64, episodes: usize, catalogue: &Arc<InterventionCatalogue>) -> QLearningAgent {
    let agent = QLearningAgent::new(AgentParams::default(), 1.0).unwrap();
    let config = TrainingConfig {
        epsilon: EpsilonSchedule {
            start: 1.0,
            floor: 0.05,
            decay: 0.99,
        },
        ..TrainingConfig::default()
    };
    let mut trainer = Trainer::new(environment(seed, catalogue), agent, config, seed).unwrap();
    let mut sampler = |_: &mut StdRng| beginner();
    trainer.train(episodes, &mut sampler).unwrap();
    trainer.into_agent()
}

#[test]
fn test_beginner_projection_is_bounded_and_monotonic() {
    let catalogue = Arc::new(InterventionCatalogue::standard());
    let agent = train(3, 150, &catalogue);

    let projector = PathProjector::new(Arc::clone(&catalogue));
    let mut env = environment(99, &catalogue);
    let path = projector.project(&agent, &mut env, &beginner(), 10).unwrap();

    assert!(path.len() <= 10);
    assert!(!path.is_empty());
    assert!(path.initial_state.mastery.iter().all(|m| *m == 0));

    let mut previous = path.initial_state;
    for step in &path.steps {
        assert_eq!(step.state, previous);
        for skill in Skill::ALL {
            assert!(step.next_state.mastery_of(skill) >= step.state.mastery_of(skill));
        }
        previous = step.next_state;
    }
    assert_eq!(path.final_state(), previous);
}

#[test]
fn test_terminal_start_runs_no_updates() {
    let catalogue = Arc::new(InterventionCatalogue::standard());
    let agent = QLearningAgent::new(AgentParams::default(), 1.0).unwrap();
    let mut trainer =
        Trainer::new(environment(1, &catalogue), agent, TrainingConfig::default(), 1).unwrap();

    let finished = StudentProfile::sample(ProfileType::HighPerformer).with_uniform_knowledge(100.0);
    let trace = trainer.run_episode(&finished).unwrap();
    assert!(trace.is_empty());
    assert!(trace.started_terminal);
    assert_eq!(trainer.agent().updates(), 0);
    assert!(trainer.env().is_terminal(&trainer.env().current_state().unwrap()));
}

#[test]
fn test_persisted_table_reproduces_projection() {
    let catalogue = Arc::new(InterventionCatalogue::standard());
    let agent = train(8, 60, &catalogue);

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("q_table.json"));
    store
        .save(
            agent.table(),
            &plp_lib::rl::TableMetadata {
                run_id: None,
                episodes_trained: 60,
                epsilon: agent.epsilon(),
            },
        )
        .unwrap();

    let (table, outcome) = load_or_create(&store, 0.0);
    assert_eq!(outcome, LoadOutcome::Loaded { entries: agent.table().len() });
    let restored = QLearningAgent::from_table(table, AgentParams::default(), 0.0).unwrap();
    assert_eq!(restored.snapshot(), agent.snapshot());

    let projector = PathProjector::new(Arc::clone(&catalogue));
    let original = projector
        .project(&agent, &mut environment(5, &catalogue), &beginner(), 10)
        .unwrap();
    let replayed = projector
        .project(&restored, &mut environment(5, &catalogue), &beginner(), 10)
        .unwrap();
    assert_eq!(original, replayed);
}

#[test]
fn test_projection_runs_against_snapshot_while_training_continues() {
    let catalogue = Arc::new(InterventionCatalogue::standard());
    let agent = QLearningAgent::new(AgentParams::default(), 1.0).unwrap();
    let mut trainer =
        Trainer::new(environment(12, &catalogue), agent, TrainingConfig::default(), 12).unwrap();
    let mut sampler = |_: &mut StdRng| beginner();
    trainer.train(20, &mut sampler).unwrap();

    let snapshot = QLearningAgent::from_table(trainer.agent().snapshot(), AgentParams::default(), 0.0)
        .unwrap();
    let projector = PathProjector::new(Arc::clone(&catalogue));

    let handle = std::thread::spawn(move || {
        let mut env = environment(4, &catalogue);
        projector.project(&snapshot, &mut env, &beginner(), 10)
    });
    trainer.train(20, &mut sampler).unwrap();

    let path = handle.join().unwrap().unwrap();
    assert!(path.len() <= 10);
}
