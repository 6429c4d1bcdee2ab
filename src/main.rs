// src/main.rs
use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use plp_lib::models::student_profile::{ProfileType, StudentProfile};
use plp_lib::rl::evaluation::evaluate_policy;
use plp_lib::rl::feedback_processor::{process_feedback, FeedbackRecord};
use plp_lib::rl::persistence::{load_or_create, JsonFileStore, LoadOutcome};
use plp_lib::rl::{
    CloneSampler, LearningEnvironment, PathProjector, QLearningAgent, QTable, Trainer,
};
use plp_lib::utils::env::load_env;
use plp_lib::utils::progress_config::ProgressConfig;
use plp_lib::utils::rl_config::RLConfig;

#[derive(Parser)]
#[command(author, version, about = "Train the learning-path Q-table", long_about = None)]
struct TrainArgs {
    /// Number of training episodes
    #[arg(long, default_value_t = 1000)]
    episodes: usize,

    /// Archetype the simulated students are cloned from
    #[arg(long, default_value = "average")]
    profile: ProfileType,

    /// JSON student profile to clone from instead of an archetype
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// Seed for every random source (overrides PLP_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Q-table location (overrides PLP_TABLE_PATH)
    #[arg(long)]
    table_path: Option<String>,

    /// Ignore any stored table and start from scratch
    #[arg(long)]
    fresh: bool,

    /// JSON array of observed feedback records to replay before training
    #[arg(long)]
    feedback: Option<PathBuf>,

    /// Greedy evaluation roll-outs to run after training (0 to skip)
    #[arg(long, default_value_t = 100)]
    evaluate: usize,

    /// Step horizon for evaluation roll-outs
    #[arg(long, default_value_t = 10)]
    horizon: usize,

    /// Write the convergence report here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,

    /// Train without saving the table
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// `RUST_LOG` (default `info`), raised to debug by `--verbose`.
fn logger_builder(verbose: bool) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder
}

fn main() -> Result<()> {
    let args = TrainArgs::parse();
    load_env();
    logger_builder(args.verbose).init();

    let start_time = Instant::now();
    let mut config = RLConfig::from_env();
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(path) = &args.table_path {
        config.table_path = path.clone();
    }
    config.validate().context("Invalid engine configuration")?;
    config.log_config();

    let catalogue = Arc::new(config.catalogue()?);
    let store = JsonFileStore::new(&config.table_path);

    let (table, outcome) = if args.fresh {
        (QTable::new(config.initial_q_value), LoadOutcome::Fresh)
    } else {
        load_or_create(&store, config.initial_q_value)
    };
    match &outcome {
        LoadOutcome::Loaded { entries } => info!("📂 Continuing from stored table ({} entries)", entries),
        LoadOutcome::Fresh => info!("🆕 Starting from a fresh table"),
        LoadOutcome::FreshAfterFailure { reason } => {
            warn!("⚠️ Stored table unusable ({}); starting from a fresh table", reason)
        }
    }

    let mut agent =
        QLearningAgent::from_table(table, config.agent_params(), config.epsilon_start)?;

    if let Some(path) = &args.feedback {
        let records: Vec<FeedbackRecord> = read_json(path)?;
        let stats = process_feedback(
            &mut agent,
            &config.environment_config(),
            &catalogue,
            &records,
        );
        info!(
            "Replayed feedback from {}: {} processed, {} skipped",
            path.display(),
            stats.processed,
            stats.skipped
        );
    }

    let base_profile = match &args.profile_file {
        Some(path) => read_json::<StudentProfile>(path)?,
        None => StudentProfile::sample(args.profile),
    };
    info!("👩‍🎓 Training on clones of profile {}", base_profile.id);

    let mut sampler_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));
    let mut sampler = CloneSampler::with_defaults(&base_profile, &mut sampler_rng);

    let env = LearningEnvironment::new(config.environment_config(), Arc::clone(&catalogue), config.seed)?;
    let mut trainer = Trainer::new(env, agent, config.training_config(), config.seed)?
        .with_store(&store)
        .with_progress(ProgressConfig::from_env());

    let report = trainer
        .train(args.episodes, &mut sampler)
        .context("Training failed")?;

    println!("{}", trainer.agent().get_stats_display());

    if args.dry_run {
        warn!("🔍 DRY RUN MODE: table not saved");
    } else {
        trainer
            .save()
            .with_context(|| format!("Failed to save Q-table to {}", config.table_path))?;
    }

    if args.evaluate > 0 {
        let mut eval_env = LearningEnvironment::new(
            config.environment_config(),
            Arc::clone(&catalogue),
            config.seed.wrapping_add(2),
        )?;
        let projector = PathProjector::new(Arc::clone(&catalogue));
        let summary = evaluate_policy(
            trainer.agent(),
            &mut eval_env,
            &projector,
            &mut sampler,
            &mut sampler_rng,
            args.evaluate,
            args.horizon,
        )?;
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    let report_json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            fs::write(path, report_json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Convergence report written to {}", path.display());
        }
        None => println!("{}", report_json),
    }

    info!(
        "✅ Finished {} episodes in {:.2?}",
        report.episodes_run,
        start_time.elapsed()
    );
    Ok(())
}
