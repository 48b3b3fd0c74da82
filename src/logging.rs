//! Logger setup.
//!
//! Two levels are configured: a general one for every module and an
//! application one for this crate.  `RUST_LOG`, when set, is applied last
//! and overrides both.

use std::str::FromStr;

use log::LevelFilter;

use crate::config::{ConfigError, LogLevelConfig};

pub fn parse_level(level: &str) -> Result<LevelFilter, ConfigError> {
    LevelFilter::from_str(level.trim()).map_err(|_| ConfigError::InvalidLogLevel(level.to_string()))
}

pub fn init(levels: &LogLevelConfig) -> anyhow::Result<()> {
    let general = parse_level(&levels.general)?;
    let application = parse_level(&levels.application)?;

    env_logger::Builder::new()
        .filter_level(general)
        .filter_module(env!("CARGO_CRATE_NAME"), application)
        .parse_default_env()
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::Debug);
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level(" off ").unwrap(), LevelFilter::Off);
        assert!(parse_level("verbose").is_err());
    }
}
