// src/bin/project_path.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use plp_lib::models::student_profile::{ProfileType, StudentProfile};
use plp_lib::rl::persistence::{JsonFileStore, QTableStore};
use plp_lib::rl::{LearningEnvironment, PathProjector, QLearningAgent};
use plp_lib::utils::env::load_env;
use plp_lib::utils::rl_config::RLConfig;

#[derive(Parser)]
#[command(author, version, about = "Project a learning path from a trained Q-table", long_about = None)]
struct ProjectArgs {
    /// Archetype profile to project for
    #[arg(long, default_value = "average")]
    profile: ProfileType,

    /// JSON student profile to project for instead of an archetype
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// Maximum number of steps
    #[arg(long, default_value_t = 10)]
    horizon: usize,

    /// Runner-up interventions to include per step
    #[arg(long, default_value_t = PathProjector::DEFAULT_ALTERNATIVES)]
    alternatives: usize,

    /// Q-table location (overrides PLP_TABLE_PATH)
    #[arg(long)]
    table_path: Option<String>,

    /// Seed for the simulated student (overrides PLP_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Print the nested tree instead of the flat path
    #[arg(long)]
    tree: bool,
}

fn main() -> Result<()> {
    load_env();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = ProjectArgs::parse();
    let mut config = RLConfig::from_env();
    if let Some(path) = &args.table_path {
        config.table_path = path.clone();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    config.validate().context("Invalid engine configuration")?;

    let store = JsonFileStore::new(&config.table_path);
    let Some(table) = store
        .load()
        .with_context(|| format!("Failed to load Q-table from {}", config.table_path))?
    else {
        bail!("No Q-table at {}; train one with `plp` first", config.table_path);
    };
    let agent = QLearningAgent::from_table(table, config.agent_params(), 0.0)?;

    let profile = match &args.profile_file {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<StudentProfile>(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        None => StudentProfile::sample(args.profile),
    };

    let catalogue = Arc::new(config.catalogue()?);
    let mut env =
        LearningEnvironment::new(config.environment_config(), Arc::clone(&catalogue), config.seed)?;
    let projector = PathProjector::new(catalogue).with_alternatives(args.alternatives);
    let path = projector.project(&agent, &mut env, &profile, args.horizon)?;

    info!(
        "🗺️ Projected {} steps for {} (termination: {:?})",
        path.len(),
        path.student_id,
        path.termination
    );

    let output = if args.tree {
        serde_json::to_string_pretty(&path.to_tree(args.alternatives))?
    } else {
        serde_json::to_string_pretty(&path)?
    };
    println!("{}", output);
    Ok(())
}
