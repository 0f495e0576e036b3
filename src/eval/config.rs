//! Benchmark settings read from `BLOCKMUL_*` environment variables.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `BLOCKMUL_BLOCK_SIZE` | `50` | Block side M; must divide `BLOCKMUL_TOTAL_SIZE` |
//! | `BLOCKMUL_GRID_SIZES` | `2,4,6` | Blocks per side N to compare, comma separated |
//! | `BLOCKMUL_RUNS` | `3` | Timed runs averaged per strategy |
//! | `BLOCKMUL_SWEEP_RUNS` | `2` | Timed runs averaged per sweep point |
//! | `BLOCKMUL_SEED` | `42` | Base seed for input generation |
//! | `BLOCKMUL_TOTAL_SIZE` | `200` | Dense matrix side used by the sweeps |
//! | `BLOCKMUL_MAX_SPLIT` | `10` | Largest N tried by the chunk sweep |
//! | `BLOCKMUL_FANOUT` | `per-cell` | `per-cell` or a thread limit for thread-per-cell strategies |
//! | `BLOCKMUL_TIMEOUT_SECS` | unset | Deadline for shared-state and pipeline runs; the pool ignores it |

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::executor::{ExecutorConfig, Fanout};

/// Invalid benchmark setting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Value could not be parsed or is out of range.
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Settings for the evaluation binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchConfig {
    pub block_size: usize,
    pub grid_sizes: Vec<usize>,
    pub runs: usize,
    pub sweep_runs: usize,
    pub seed: u64,
    pub total_size: usize,
    pub max_split: usize,
    pub fanout: Fanout,
    pub deadline: Option<Duration>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            block_size: 50,
            grid_sizes: vec![2, 4, 6],
            runs: 3,
            sweep_runs: 2,
            seed: 42,
            total_size: 200,
            max_split: 10,
            fanout: Fanout::PerCell,
            deadline: None,
        }
    }
}

impl BenchConfig {
    /// Read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first bad variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first bad variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let grid_sizes = match lookup("BLOCKMUL_GRID_SIZES") {
            Some(raw) => parse_list("BLOCKMUL_GRID_SIZES", &raw)?,
            None => defaults.grid_sizes,
        };
        let fanout = match lookup("BLOCKMUL_FANOUT") {
            Some(raw) => parse_fanout(&raw)?,
            None => defaults.fanout,
        };
        let deadline = match lookup("BLOCKMUL_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = positive::<u64>("BLOCKMUL_TIMEOUT_SECS", &raw)?;
                Some(Duration::from_secs(secs))
            }
            None => defaults.deadline,
        };
        let seed = match lookup("BLOCKMUL_SEED") {
            Some(raw) => parse::<u64>("BLOCKMUL_SEED", &raw)?,
            None => defaults.seed,
        };

        let block_size = read(&lookup, "BLOCKMUL_BLOCK_SIZE", defaults.block_size)?;
        let total_size = read(&lookup, "BLOCKMUL_TOTAL_SIZE", defaults.total_size)?;
        if total_size % block_size != 0 {
            return Err(ConfigError::Invalid {
                key: "BLOCKMUL_BLOCK_SIZE",
                value: block_size.to_string(),
                reason: format!("must divide BLOCKMUL_TOTAL_SIZE={total_size}"),
            });
        }

        Ok(Self {
            block_size,
            grid_sizes,
            runs: read(&lookup, "BLOCKMUL_RUNS", defaults.runs)?,
            sweep_runs: read(&lookup, "BLOCKMUL_SWEEP_RUNS", defaults.sweep_runs)?,
            seed,
            total_size,
            max_split: read(&lookup, "BLOCKMUL_MAX_SPLIT", defaults.max_split)?,
            fanout,
            deadline,
        })
    }

    /// `(n, m)` for the worker sweep: `total_size` cut into blocks of
    /// `block_size`.
    pub fn sweep_grid(&self) -> (usize, usize) {
        (self.total_size / self.block_size, self.block_size)
    }

    /// Executor settings implied by these benchmark settings.
    pub fn executor_config(&self) -> ExecutorConfig {
        let config = ExecutorConfig::default().with_fanout(self.fanout);
        match self.deadline {
            Some(deadline) => config.with_deadline(deadline),
            None => config,
        }
    }
}

/// Positive integer from `lookup`, or `default` when unset.
fn read(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: usize,
) -> Result<usize, ConfigError> {
    lookup(key).map_or(Ok(default), |raw| positive(key, &raw))
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn positive<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: Display,
{
    let value = parse::<T>(key, raw)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(value)
}

fn parse_list(key: &'static str, raw: &str) -> Result<Vec<usize>, ConfigError> {
    let values = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| positive(key, part))
        .collect::<Result<Vec<usize>, _>>()?;
    if values.is_empty() {
        return Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected at least one size".to_string(),
        });
    }
    Ok(values)
}

fn parse_fanout(raw: &str) -> Result<Fanout, ConfigError> {
    if raw.trim().eq_ignore_ascii_case("per-cell") {
        return Ok(Fanout::PerCell);
    }
    positive("BLOCKMUL_FANOUT", raw).map(Fanout::Bounded)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<BenchConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        BenchConfig::from_lookup(move |key: &str| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = BenchConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, BenchConfig::default());
        assert_eq!(config.executor_config(), ExecutorConfig::default());
        assert_eq!(config.sweep_grid(), (4, 50));
    }

    #[test]
    fn test_reads_every_variable() {
        let config = load(&[
            ("BLOCKMUL_BLOCK_SIZE", "8"),
            ("BLOCKMUL_GRID_SIZES", "1, 3,5"),
            ("BLOCKMUL_RUNS", "4"),
            ("BLOCKMUL_SWEEP_RUNS", "1"),
            ("BLOCKMUL_SEED", "0"),
            ("BLOCKMUL_TOTAL_SIZE", "64"),
            ("BLOCKMUL_MAX_SPLIT", "4"),
            ("BLOCKMUL_FANOUT", "6"),
            ("BLOCKMUL_TIMEOUT_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.block_size, 8);
        assert_eq!(config.grid_sizes, vec![1, 3, 5]);
        assert_eq!(config.runs, 4);
        assert_eq!(config.sweep_runs, 1);
        assert_eq!(config.seed, 0);
        assert_eq!(config.total_size, 64);
        assert_eq!(config.max_split, 4);
        assert_eq!(config.fanout, Fanout::Bounded(6));
        assert_eq!(config.deadline, Some(Duration::from_secs(30)));
        assert_eq!(
            config.executor_config().deadline,
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.sweep_grid(), (8, 8));
    }

    #[test]
    fn test_rejects_zero_and_garbage() {
        let err = load(&[("BLOCKMUL_RUNS", "0")]).unwrap_err();
        assert!(err.to_string().contains("BLOCKMUL_RUNS"));

        assert!(load(&[("BLOCKMUL_BLOCK_SIZE", "big")]).is_err());
        assert!(load(&[("BLOCKMUL_GRID_SIZES", " , ")]).is_err());
        assert!(load(&[("BLOCKMUL_FANOUT", "0")]).is_err());
        assert!(load(&[("BLOCKMUL_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn test_block_size_must_divide_total_size() {
        let err = load(&[("BLOCKMUL_BLOCK_SIZE", "64")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "BLOCKMUL_BLOCK_SIZE",
                value: "64".to_string(),
                reason: "must divide BLOCKMUL_TOTAL_SIZE=200".to_string(),
            }
        );

        let too_big = load(&[
            ("BLOCKMUL_BLOCK_SIZE", "50"),
            ("BLOCKMUL_TOTAL_SIZE", "30"),
        ]);
        assert!(too_big.is_err());

        let config = load(&[("BLOCKMUL_BLOCK_SIZE", "40")]).unwrap();
        let (n, m) = config.sweep_grid();
        assert_eq!((n, m), (5, 40));
        assert_eq!(n * m, config.total_size);
    }

    #[test]
    fn test_fanout_per_cell_keyword() {
        let config = load(&[("BLOCKMUL_FANOUT", "Per-Cell")]).unwrap();
        assert_eq!(config.fanout, Fanout::PerCell);
    }
}
