//! Configuration module - environment variable parsing

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::util::time::SIMULATION_TPS;

/// Runner configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Boundary geometry file; the arena is open when unset
    pub map_path: Option<PathBuf>,
    /// Number of bot-driven racers to spawn
    pub bot_count: usize,

    /// Simulation speed multiplier
    pub time_scale: f32,
    /// Seed for bot decisions
    pub sim_seed: u64,
    /// Physics ticks per second
    pub tick_rate: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let time_scale: f32 = parse_or(&lookup, "TIME_SCALE", 1.0)?;
        if !(time_scale.is_finite() && time_scale > 0.0) {
            return Err(ConfigError::Invalid("TIME_SCALE"));
        }

        let tick_rate: u32 = parse_or(&lookup, "TICK_RATE", SIMULATION_TPS)?;
        if tick_rate == 0 {
            return Err(ConfigError::Invalid("TICK_RATE"));
        }

        Ok(Self {
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            map_path: lookup("MAP_PATH")
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            bot_count: parse_or(&lookup, "BOT_COUNT", 4)?,

            time_scale,
            sim_seed: parse_or(&lookup, "SIM_SEED", 0)?,
            tick_rate,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.log_level, "info");
        assert!(config.map_path.is_none());
        assert_eq!(config.bot_count, 4);
        assert_eq!(config.time_scale, 1.0);
        assert_eq!(config.sim_seed, 0);
        assert_eq!(config.tick_rate, 60);
    }

    #[test]
    fn values_are_read_from_the_environment() {
        let config = load(&[
            ("MAP_PATH", "maps/arena.txt"),
            ("BOT_COUNT", "2"),
            ("TIME_SCALE", " 0.5 "),
            ("SIM_SEED", "42"),
        ])
        .unwrap();
        assert_eq!(config.map_path, Some(PathBuf::from("maps/arena.txt")));
        assert_eq!(config.bot_count, 2);
        assert_eq!(config.time_scale, 0.5);
        assert_eq!(config.sim_seed, 42);
    }

    #[test]
    fn rejects_bad_numbers() {
        assert!(matches!(load(&[("TIME_SCALE", "0")]), Err(ConfigError::Invalid("TIME_SCALE"))));
        assert!(matches!(load(&[("TIME_SCALE", "-1")]), Err(ConfigError::Invalid("TIME_SCALE"))));
        assert!(matches!(load(&[("BOT_COUNT", "many")]), Err(ConfigError::Invalid("BOT_COUNT"))));
        assert!(matches!(load(&[("TICK_RATE", "0")]), Err(ConfigError::Invalid("TICK_RATE"))));
    }
}
