// src/main.rs
use clap::Parser;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use oreminer::miner::algorithm;
use oreminer::miner::scheduler::Worker;
use oreminer::network::rpc::WorkIo;
use oreminer::network::{StratumSession, longpoll};
use oreminer::{self, *};

/// Main entry point for the miner
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Benchmark(opts) => run_benchmark(opts),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining operation with given configuration options
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads the configuration file and applies CLI overrides
/// 3. Validates the merged configuration
/// 4. Spawns the mining threads and waits for shutdown
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = if opts.config.exists() {
        config::load(&opts.config)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(url) = opts.url {
        config.url = url;
    }
    if let Some(user) = opts.user {
        config.user = user;
    }
    if let Some(pass) = opts.pass {
        config.pass = pass;
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo;
    }
    if let Some(workers) = opts.workers {
        config.workers = workers;
    }
    if let Some(retries) = opts.retries {
        config.retries = retries;
    }
    if let Some(pause) = opts.retry_pause {
        config.fail_pause = pause;
    }
    if let Some(timeout) = opts.timeout {
        config.timeout = timeout;
    }
    if let Some(scantime) = opts.scantime {
        config.scantime = scantime;
    }
    if opts.no_longpoll {
        config.long_poll = false;
    }
    if opts.no_stratum {
        config.stratum = false;
    }
    if let Some(vote) = opts.vote {
        config.vote = Some(vote);
    }
    if opts.trust_pool {
        config.trust_pool = true;
    }
    if let Some(diff) = opts.diff {
        config.difficulty = diff;
    }
    if let Some(proxy) = opts.proxy {
        config.proxy = Some(proxy);
    }
    if opts.quiet {
        config.quiet = true;
    }

    config.validate()?;
    run_miner(Arc::new(config))
}

/// Runs the compute backend self-test without any pool connection
fn run_benchmark(opts: cli::BenchmarkOptions) -> Result<(), MinerError> {
    utils::logging::init_debug_logging();

    let config = Config {
        algorithm: opts.algorithm,
        workers: opts.workers,
        benchmark: true,
        ..Config::default()
    };
    config.validate()?;

    log::info!("benchmarking '{}' with {} threads", opts.algorithm, opts.workers);
    run_miner(Arc::new(config))
}

/// Generates configuration template file
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    let config = config::generate_template();
    std::fs::write(opts.output, config)?;
    Ok(())
}

/// Wires up shared state, spawns every miner thread, and blocks until
/// the work I/O thread exits
///
/// Thread layout: one work I/O thread (the liveness root), one stratum
/// session or long-poll thread depending on the pool URL, and one
/// scheduler thread per worker. The work I/O thread freezes its queue
/// on exit, which is what every other thread eventually observes.
fn run_miner(config: Arc<Config>) -> Result<(), MinerError> {
    let caps = algorithm::caps(config.algorithm);
    let ctx = Arc::new(MinerState::new(config.workers));
    let stats = Arc::new(ShareStats::new(config.workers));
    let workio_queue: Arc<CommandQueue<WorkCmd>> = Arc::new(CommandQueue::new());
    let lp_queue: Arc<CommandQueue<String>> = Arc::new(CommandQueue::new());

    let stratum_mode = config.is_stratum() && config.stratum && !config.benchmark;
    ctx.have_stratum.store(stratum_mode, Ordering::SeqCst);

    let workio = WorkIo::new(
        Arc::clone(&config),
        caps,
        Arc::clone(&ctx),
        Arc::clone(&stats),
        Arc::clone(&workio_queue),
        Arc::clone(&lp_queue),
    )?;
    let workio_handle = thread::spawn(move || workio.run());

    let stratum = if stratum_mode {
        let session = Arc::new(StratumSession::new(
            Arc::clone(&config),
            caps,
            Arc::clone(&ctx),
            Arc::clone(&stats),
            Arc::clone(&workio_queue),
        ));
        let handle = Arc::clone(&session);
        thread::spawn(move || handle.run());
        Some(session)
    } else {
        None
    };

    if config.long_poll && !stratum_mode && !config.benchmark {
        let cfg = Arc::clone(&config);
        let lp_ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&lp_queue);
        thread::spawn(move || longpoll::run(cfg, caps, lp_ctx, queue));
    }

    let backend = algorithm::backend(config.algorithm);
    for id in 0..config.workers {
        let worker = Worker::new(
            id,
            Arc::clone(&config),
            caps,
            Arc::clone(&ctx),
            Arc::clone(&stats),
            Arc::clone(&workio_queue),
            stratum.clone(),
            Arc::clone(&backend),
        );
        thread::spawn(move || worker.run());
    }

    log::info!(
        "{} worker threads started, using '{}' algorithm",
        config.workers,
        config.algorithm
    );

    if workio_handle.join().is_err() {
        log::error!("work I/O thread panicked");
    }
    log::info!("work I/O thread finished, exiting");
    Ok(())
}
