use clap::Parser;
use hs_study::JsonStore;
use hs_worker::config::{self, Overrides, SweepConfig};
use hs_worker::runner::StopReason;
use hs_worker::worker::{self, StudyMode};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// A budget-governed hyperparameter-sweep worker. Attaches to a shared
/// study, runs trials sequentially, and stops cleanly before its wall-time
/// allowance runs out.
#[derive(Debug, Parser)]
#[command(name = "hs-worker", version)]
struct Cli {
    /// Path to the sweep configuration (study, search space, logging)
    sweep_config: PathBuf,

    /// Path to the model/task configuration passed to the objective
    model_config: PathBuf,

    /// Override the study name
    #[arg(long)]
    study_name: Option<String>,

    /// Override the storage location
    #[arg(long)]
    storage: Option<String>,

    /// Override the optimization direction (maximize or minimize)
    #[arg(long)]
    direction: Option<String>,

    /// Override the validation metric
    #[arg(long)]
    metric: Option<String>,

    /// Override the number of trials
    #[arg(long)]
    trials: Option<u64>,

    /// Override the sampler choice
    #[arg(long)]
    sampler: Option<String>,

    /// Override the objective choice
    #[arg(long)]
    objective: Option<String>,

    /// Resume an existing study instead of creating a fresh one
    #[arg(long)]
    resume: Option<bool>,

    /// Create (or repair) the study, then exit without running trials
    #[arg(long)]
    create_study: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            study_name: self.study_name.clone(),
            storage: self.storage.clone(),
            direction: self.direction.clone(),
            metric: self.metric.clone(),
            n_trials: self.trials,
            sampler: self.sampler.clone(),
            objective: self.objective.clone(),
            resume: self.resume,
        }
    }
}

const EXIT_CLEAN: i32 = 0;
const EXIT_RUN_ERROR: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_INTERRUPTED: i32 = 130;

fn init_tracing(config: &SweepConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Mirror everything into the configured log file, appending when the
    // study is being resumed so the fleet's history stays in one place.
    let file_layer = match &config.log {
        Some(log) => {
            if let Some(parent) = std::path::Path::new(&log.save_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = if config.study.resume {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&log.save_path)?
            } else {
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&log.save_path)?
            };
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut sweep_config, sweep_raw) = match config::load_sweep_config(&cli.sweep_config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("hs-worker: {err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    let model_config = match config::load_model_config(&cli.model_config) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("hs-worker: {err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    init_tracing(&sweep_config)?;
    let run_id = Uuid::new_v4();
    info!("Worker {run_id} starting");

    config::apply_overrides(&mut sweep_config, &cli.overrides());

    info!("Current sweep configuration:");
    for (path, value) in config::configuration_report(&sweep_raw) {
        info!("{path}: {value}");
    }
    info!("Current model configuration:");
    for (path, value) in config::configuration_report(&model_config) {
        info!("{path}: {value}");
    }

    // Validate up front so nothing runs on a bad configuration.
    let directions = match sweep_config.directions() {
        Ok(directions) => directions,
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };
    if let Err(err) = sweep_config.wall_time() {
        error!("{err}");
        std::process::exit(EXIT_CONFIG_ERROR);
    }
    info!(
        "Optimizing {:?} in direction(s) {directions:?} on device {}",
        sweep_config.metrics(),
        sweep_config.device()
    );

    let store = match JsonStore::open(&sweep_config.study.storage) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            error!("{err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    if cli.create_study {
        let mode = if sweep_config.study.resume {
            StudyMode::Resume
        } else {
            StudyMode::Fresh
        };
        let meta = match sweep_config.study_meta() {
            Ok(meta) => meta,
            Err(err) => {
                error!("{err}");
                std::process::exit(EXIT_CONFIG_ERROR);
            }
        };
        match worker::open_study(store.as_ref(), meta, mode) {
            Ok((meta, _removed)) => {
                info!("Study {} is ready. Exiting without running trials", meta.id);
                std::process::exit(EXIT_CLEAN);
            }
            Err(err) => {
                error!("{err}");
                std::process::exit(EXIT_CONFIG_ERROR);
            }
        }
    }

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; finishing up and stopping");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    // The trial loop is deliberately synchronous; keep it off the async
    // runtime's core threads.
    let result = tokio::task::spawn_blocking(move || {
        worker::run_sweep(&sweep_config, &model_config, store, interrupt)
    })
    .await?;

    match result {
        Ok(report) => {
            info!(
                "Worker {run_id} done: {} trial(s) in {:.1}s",
                report.trials_run,
                report.elapsed.as_secs_f64()
            );
            let code = match report.reason {
                StopReason::TargetReached | StopReason::BudgetExhausted => EXIT_CLEAN,
                StopReason::Interrupted => EXIT_INTERRUPTED,
                StopReason::Error(_) => EXIT_RUN_ERROR,
            };
            std::process::exit(code);
        }
        Err(err) => {
            error!("Worker {run_id} could not start its run: {err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    }
}
