// src/types.rs
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported proof-of-work algorithm families
///
/// Each family shares a job source and scheduler but differs in its
/// merkle combine rule, header layout quirks, and difficulty scaling.
/// The actual hash kernels are supplied by a compute backend; see
/// [`crate::miner::algorithm`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlgorithmType {
    /// Heavycoin hash (carries the block reward vote extension)
    #[value(name = "heavy")]
    Heavy,

    /// Mjollnircoin hash (Heavy family without the vote extension)
    #[value(name = "mjollnir")]
    Mjollnir,

    /// Fuguecoin hash
    #[value(name = "fugue256")]
    Fugue256,

    /// Groestlcoin hash
    #[value(name = "groestl")]
    Groestl,

    /// Myriad-Groestl hash
    #[value(name = "myr-gr")]
    #[serde(rename = "myr-gr")]
    MyrGr,

    /// Jackpot hash
    #[value(name = "jackpot")]
    Jackpot,

    /// Quark hash
    #[value(name = "quark")]
    Quark,

    /// Animecoin hash
    #[value(name = "anime")]
    Anime,

    /// NIST5 (TalkCoin) hash
    #[value(name = "nist5")]
    Nist5,

    /// X11 (DarkCoin) hash
    #[value(name = "x11")]
    X11,

    /// X13 (MaruCoin) hash
    #[value(name = "x13")]
    X13,

    /// Diamond-Groestl hash
    #[value(name = "dmd-gr")]
    #[serde(rename = "dmd-gr")]
    DmdGr,
}

impl AlgorithmType {
    /// Canonical lowercase name as used on the CLI and in config files.
    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmType::Heavy => "heavy",
            AlgorithmType::Mjollnir => "mjollnir",
            AlgorithmType::Fugue256 => "fugue256",
            AlgorithmType::Groestl => "groestl",
            AlgorithmType::MyrGr => "myr-gr",
            AlgorithmType::Jackpot => "jackpot",
            AlgorithmType::Quark => "quark",
            AlgorithmType::Anime => "anime",
            AlgorithmType::Nist5 => "nist5",
            AlgorithmType::X11 => "x11",
            AlgorithmType::X13 => "x13",
            AlgorithmType::DmdGr => "dmd-gr",
        }
    }

    /// Whether this family carries the block reward vote extension.
    pub fn uses_vote(&self) -> bool {
        matches!(self, AlgorithmType::Heavy)
    }
}

impl fmt::Display for AlgorithmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "heavy" => Ok(AlgorithmType::Heavy),
            "mjollnir" => Ok(AlgorithmType::Mjollnir),
            "fugue256" => Ok(AlgorithmType::Fugue256),
            "groestl" => Ok(AlgorithmType::Groestl),
            "myr-gr" => Ok(AlgorithmType::MyrGr),
            "jackpot" => Ok(AlgorithmType::Jackpot),
            "quark" => Ok(AlgorithmType::Quark),
            "anime" => Ok(AlgorithmType::Anime),
            "nist5" => Ok(AlgorithmType::Nist5),
            "x11" => Ok(AlgorithmType::X11),
            "x13" => Ok(AlgorithmType::X13),
            "dmd-gr" => Ok(AlgorithmType::DmdGr),
            _ => Err(format!("Unknown algorithm: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trips_through_from_str() {
        for algo in [
            AlgorithmType::Heavy,
            AlgorithmType::Mjollnir,
            AlgorithmType::Fugue256,
            AlgorithmType::Groestl,
            AlgorithmType::MyrGr,
            AlgorithmType::Jackpot,
            AlgorithmType::Quark,
            AlgorithmType::Anime,
            AlgorithmType::Nist5,
            AlgorithmType::X11,
            AlgorithmType::X13,
            AlgorithmType::DmdGr,
        ] {
            assert_eq!(algo.name().parse::<AlgorithmType>(), Ok(algo));
        }
    }

    #[test]
    fn only_heavy_votes() {
        assert!(AlgorithmType::Heavy.uses_vote());
        assert!(!AlgorithmType::Mjollnir.uses_vote());
        assert!(!AlgorithmType::X11.uses_vote());
    }
}
