// src/cli/commands.rs
use crate::types::AlgorithmType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Ore Miner CLI - multi-algorithm pool mining client
#[derive(Parser, Debug)]
#[command(name = "oreminer")]
#[command(version, about, long_about = None)]
pub struct Commands {
    /// The action to perform (start mining, run a benchmark, or generate config)
    #[command(subcommand)]
    pub action: Action,
}

/// Top-level commands for the miner application
#[derive(Subcommand, Debug)]
pub enum Action {
    /// Start mining against the configured pool
    Start(StartOptions),

    /// Run the built-in self-test benchmark
    Benchmark(BenchmarkOptions),

    /// Generate configuration file template
    Config(ConfigOptions),
}

/// Options for starting the mining operation
///
/// Every option here overrides the corresponding configuration file
/// field when given.
#[derive(Parser, Debug)]
pub struct StartOptions {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Pool URL (http(s):// for getwork, stratum+tcp:// for stratum)
    #[arg(short = 'o', long)]
    pub url: Option<String>,

    /// Pool username or wallet address
    #[arg(short, long)]
    pub user: Option<String>,

    /// Pool password
    #[arg(short, long)]
    pub pass: Option<String>,

    /// Mining algorithm to use
    #[arg(short, long)]
    pub algorithm: Option<AlgorithmType>,

    /// Number of worker threads to use
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Consecutive network failures tolerated before giving up (-1 = forever)
    #[arg(short, long)]
    pub retries: Option<i32>,

    /// Seconds to pause between retries
    #[arg(long)]
    pub retry_pause: Option<u64>,

    /// Overall HTTP request timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Target seconds per scan round on the getwork path
    #[arg(short, long)]
    pub scantime: Option<u64>,

    /// Disable long polling even when the pool offers it
    #[arg(long)]
    pub no_longpoll: bool,

    /// Disable the stratum protocol even for stratum+tcp URLs
    #[arg(long)]
    pub no_stratum: bool,

    /// Block reward vote for the voting algorithm family
    #[arg(short, long)]
    pub vote: Option<u16>,

    /// Trust the pool's advertised vote maximum
    #[arg(short = 'm', long)]
    pub trust_pool: bool,

    /// Difficulty factor applied on top of the pool difficulty
    #[arg(short, long)]
    pub diff: Option<f64>,

    /// HTTP proxy for getwork traffic
    #[arg(short = 'x', long)]
    pub proxy: Option<String>,

    /// Suppress routine informational output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Options for running the self-test benchmark
#[derive(Parser, Debug)]
pub struct BenchmarkOptions {
    /// Algorithm to benchmark
    #[arg(short, long)]
    pub algorithm: AlgorithmType,

    /// Number of worker threads to use
    #[arg(short, long, default_value_t = num_cpus::get())]
    pub workers: usize,
}

/// Options for generating configuration files
#[derive(Parser, Debug)]
pub struct ConfigOptions {
    /// Output file path
    #[arg(short, long, default_value = "config.toml")]
    pub output: PathBuf,
}
