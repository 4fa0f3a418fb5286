// src/config/config.rs
use crate::types::AlgorithmType;
use crate::utils::error::MinerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure for the mining application
///
/// Contains all settings needed to configure mining operations:
/// algorithm selection, pool endpoint and credentials, worker count,
/// and the retry/timing knobs shared by every network component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Mining algorithm (e.g., "quark", "heavy", "x11")
    #[serde(default = "default_algorithm")]
    pub algorithm: AlgorithmType,

    /// Pool URL: `http(s)://` for getwork, `stratum+tcp://` for stratum
    #[serde(default)]
    pub url: String,

    /// Pool username or wallet address
    #[serde(default)]
    pub user: String,

    /// Pool password
    #[serde(default = "default_pass")]
    pub pass: String,

    /// Optional HTTP proxy for getwork traffic
    #[serde(default)]
    pub proxy: Option<String>,

    /// Number of worker threads (default: number of CPU cores)
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Consecutive network failures tolerated before giving up
    /// (-1 = retry forever)
    #[serde(default = "default_retries")]
    pub retries: i32,

    /// Seconds to pause between retries
    #[serde(default = "default_fail_pause")]
    pub fail_pause: u64,

    /// Overall HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Target seconds per scan round on the plain getwork path
    #[serde(default = "default_scantime")]
    pub scantime: u64,

    /// Whether to use long polling when the pool offers it
    #[serde(default = "default_true")]
    pub long_poll: bool,

    /// Whether a stratum+tcp URL actually starts a stratum session
    #[serde(default = "default_true")]
    pub stratum: bool,

    /// Block reward vote for the voting algorithm family
    #[serde(default)]
    pub vote: Option<u16>,

    /// Reduce an excessive vote to the pool-advertised maximum
    #[serde(default)]
    pub trust_pool: bool,

    /// Difficulty factor applied on top of the pool difficulty
    #[serde(default = "default_difficulty")]
    pub difficulty: f64,

    /// Suppress routine informational output
    #[serde(default)]
    pub quiet: bool,

    /// Run the built-in benchmark instead of connecting to a pool
    #[serde(default, skip)]
    pub benchmark: bool,
}

fn default_algorithm() -> AlgorithmType {
    AlgorithmType::Heavy
}

fn default_pass() -> String {
    "x".into()
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_retries() -> i32 {
    -1
}

fn default_fail_pause() -> u64 {
    30
}

fn default_timeout() -> u64 {
    270
}

fn default_scantime() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_difficulty() -> f64 {
    1.0
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: default_algorithm(),
            url: String::new(),
            user: String::new(),
            pass: default_pass(),
            proxy: None,
            workers: default_workers(),
            retries: default_retries(),
            fail_pause: default_fail_pause(),
            timeout: default_timeout(),
            scantime: default_scantime(),
            long_poll: true,
            stratum: true,
            vote: None,
            trust_pool: false,
            difficulty: default_difficulty(),
            quiet: false,
            benchmark: false,
        }
    }
}

impl Config {
    /// Loads configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Ok(Config)` - Successfully loaded configuration
    /// * `Err(MinerError)` - If file couldn't be read or parsed
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MinerError> {
        let path = path.into();
        let config_str = std::fs::read_to_string(&path).map_err(|e| {
            MinerError::ConfigError(format!(
                "Failed to read config at {}: {}",
                path.display(),
                e
            ))
        })?;

        toml::from_str(&config_str)
            .map_err(|e| MinerError::ConfigError(format!("Invalid config format: {}", e)))
    }

    /// Whether the configured pool speaks the stratum protocol.
    pub fn is_stratum(&self) -> bool {
        self.url.starts_with("stratum+tcp://")
    }

    /// Checks cross-field constraints before any thread is started.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.benchmark {
            return Ok(());
        }
        if self.url.is_empty() {
            return Err(MinerError::ConfigError("no pool URL configured".into()));
        }
        if !self.is_stratum()
            && !self.url.starts_with("http://")
            && !self.url.starts_with("https://")
        {
            return Err(MinerError::ConfigError(format!(
                "unsupported pool URL scheme: {}",
                self.url
            )));
        }
        if self.workers == 0 {
            return Err(MinerError::ConfigError(
                "worker count must be at least 1".into(),
            ));
        }
        if self.difficulty <= 0.0 {
            return Err(MinerError::ConfigError(
                "difficulty factor must be positive".into(),
            ));
        }
        if self.algorithm.uses_vote() && self.vote.is_none() {
            return Err(MinerError::ConfigError(format!(
                "algorithm '{}' requires a block reward vote (see --vote)",
                self.algorithm
            )));
        }
        Ok(())
    }

    /// Generates a configuration template string
    ///
    /// # Returns
    /// String containing a commented TOML configuration template
    pub fn generate_template() -> String {
        let mut template = String::new();
        template.push_str("# Ore Miner Configuration\n\n");
        template.push_str("# Supported algorithms: heavy, mjollnir, fugue256, groestl,\n");
        template.push_str("# myr-gr, jackpot, quark, anime, nist5, x11, x13, dmd-gr\n");
        template.push_str("algorithm = \"heavy\"\n\n");
        template.push_str("# Pool endpoint: http(s):// for getwork, stratum+tcp:// for stratum\n");
        template.push_str("url = \"stratum+tcp://pool.example.com:3333\"\n");
        template.push_str("user = \"your_wallet_address\"\n");
        template.push_str("pass = \"x\"\n\n");
        template.push_str("# Number of worker threads (defaults to CPU core count)\n");
        template.push_str("# workers = 4\n\n");
        template.push_str("# Network failure handling\n");
        template.push_str("retries = -1\n");
        template.push_str("fail_pause = 30\n");
        template.push_str("timeout = 270\n\n");
        template.push_str("# Scan pacing and long polling (getwork mode)\n");
        template.push_str("scantime = 5\n");
        template.push_str("long_poll = true\n\n");
        template.push_str("# Voting family settings\n");
        template.push_str("# vote = 1024\n");
        template.push_str("# trust_pool = true\n");
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.algorithm, AlgorithmType::Heavy);
        assert_eq!(cfg.pass, "x");
        assert_eq!(cfg.retries, -1);
        assert_eq!(cfg.fail_pause, 30);
        assert_eq!(cfg.timeout, 270);
        assert_eq!(cfg.scantime, 5);
        assert!(cfg.long_poll);
        assert_eq!(cfg.difficulty, 1.0);
    }

    #[test]
    fn template_round_trips_through_toml() {
        let cfg: Config = toml::from_str(&Config::generate_template()).unwrap();
        assert_eq!(cfg.algorithm, AlgorithmType::Heavy);
        assert_eq!(cfg.url, "stratum+tcp://pool.example.com:3333");
        assert!(cfg.is_stratum());
    }

    #[test]
    fn sparse_config_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            algorithm = "quark"
            url = "http://pool:8332"
            user = "miner"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.algorithm, AlgorithmType::Quark);
        assert!(!cfg.is_stratum());
        assert_eq!(cfg.fail_pause, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn voting_family_requires_a_vote() {
        let mut cfg = Config {
            url: "stratum+tcp://pool:3333".into(),
            ..Config::default()
        };
        assert!(cfg.validate().is_err());

        cfg.vote = Some(1024);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn url_scheme_is_checked() {
        let cfg = Config {
            url: "ftp://pool:21".into(),
            algorithm: AlgorithmType::Quark,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
