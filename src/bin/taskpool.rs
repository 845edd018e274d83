use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};

use taskpool::{FullPolicy, PoolConfig, PoolError, QueueMode, Result, WorkerPool};

#[derive(Parser)]
#[command(
    name = "taskpool",
    version,
    about = "Runs a synthetic workload on a worker pool"
)]
struct Cli {
    /// Number of worker threads [default: number of CPUs]
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Number of tasks to submit
    #[arg(long, default_value_t = 16, value_name = "M")]
    tasks: u64,

    /// How long each task sleeps before computing its value
    #[arg(long, default_value_t = 10, value_name = "MS")]
    sleep_ms: u64,

    /// Make every K-th task divide by zero (0 disables failures)
    #[arg(long, default_value_t = 0, value_name = "K")]
    fail_every: u64,

    /// Bound the job queue to this many pending tasks
    #[arg(long, value_name = "C")]
    queue_capacity: Option<usize>,

    /// Reject submissions while the bounded queue is full instead of blocking
    #[arg(long, requires = "queue_capacity")]
    reject_when_full: bool,

    /// JSON pool configuration; explicit flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print each completion as a JSON object
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = resolve_config(&cli)?;
    info!("taskpool {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Running {} tasks on {} threads ({:?} queue)",
        cli.tasks, config.size, config.queue
    );

    let pool: WorkerPool<u64> = WorkerPool::with_config(config)?;
    let sleep = Duration::from_millis(cli.sleep_ms);
    let started = Instant::now();

    let mut rejected = 0;
    for i in 0..cli.tasks {
        let fails = cli.fail_every > 0 && i % cli.fail_every == 0;
        let submitted = pool.submit_fallible(move || {
            thread::sleep(sleep);
            if fails {
                i.checked_div(0).ok_or("attempt to divide by zero")
            } else {
                Ok(i * i)
            }
        });
        match submitted {
            Ok(_) => {}
            Err(PoolError::QueueFull) => rejected += 1,
            Err(e) => return Err(e),
        }
    }

    pool.shutdown(false)?;

    let (mut completed, mut failed) = (0u64, 0u64);
    for completion in pool.results() {
        completed += 1;
        if cli.json {
            println!("{}", serde_json::to_string(&completion)?);
        } else {
            match &completion.outcome {
                Ok(value) => println!("task {}: ok {}", completion.id, value),
                Err(e) => println!("task {}: {}", completion.id, e),
            }
        }
        if completion.outcome.is_err() {
            failed += 1;
        }
    }

    pool.join()?;
    info!("Pool stats: {}", serde_json::to_string(&pool.stats())?);
    println!(
        "completed: {}, failed: {}, rejected: {}, elapsed: {}ms",
        completed,
        failed,
        rejected,
        started.elapsed().as_millis()
    );

    Ok(())
}

/// Merges the config file, if any, with explicit command line flags.
fn resolve_config(cli: &Cli) -> Result<PoolConfig> {
    let mut config = match &cli.config {
        Some(path) => PoolConfig::from_file(path)?,
        None => PoolConfig::default(),
    };

    if let Some(threads) = cli.threads {
        config.size = threads;
    }
    if let Some(capacity) = cli.queue_capacity {
        let on_full = if cli.reject_when_full {
            FullPolicy::Reject
        } else {
            FullPolicy::Block
        };
        config.queue = QueueMode::Bounded { capacity, on_full };
    }

    Ok(config)
}
