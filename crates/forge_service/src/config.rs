use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use forge_core::model::{CONVERTED_WEEKLY_GOAL, DEFAULT_CHALLENGE_DAYS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgeConfig {
    pub challenge_days: u32,
    pub converted_weekly_goal: u32,
    pub conversion_max_attempts: u32,
    pub conversion_delay: Duration,
    pub conversion_retry_delay: Duration,
    /// Directory for the JSON store. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            challenge_days: DEFAULT_CHALLENGE_DAYS,
            converted_weekly_goal: CONVERTED_WEEKLY_GOAL,
            conversion_max_attempts: 3,
            conversion_delay: Duration::from_millis(1000),
            conversion_retry_delay: Duration::from_millis(500),
            data_dir: None,
        }
    }
}

impl ForgeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(days) = parse_positive(&lookup, "FORGE_CHALLENGE_DAYS") {
            config.challenge_days = days;
        }
        if let Some(goal) = parse_positive(&lookup, "FORGE_CONVERTED_WEEKLY_GOAL") {
            config.converted_weekly_goal = goal;
        }
        if let Some(attempts) = parse_positive(&lookup, "FORGE_CONVERSION_MAX_ATTEMPTS") {
            config.conversion_max_attempts = attempts;
        }
        if let Some(ms) = parse_value::<u64>(&lookup, "FORGE_CONVERSION_DELAY_MS") {
            config.conversion_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_value::<u64>(&lookup, "FORGE_CONVERSION_RETRY_DELAY_MS") {
            config.conversion_retry_delay = Duration::from_millis(ms);
        }
        if let Some(dir) = lookup("FORGE_DATA_DIR").filter(|dir| !dir.trim().is_empty()) {
            let path = PathBuf::from(dir.trim());
            anyhow::ensure!(
                !path.is_file(),
                "FORGE_DATA_DIR `{}` is a file, expected a directory",
                path.display()
            );
            config.data_dir = Some(path);
        }
        Ok(config)
    }
}

fn parse_value<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

fn parse_positive(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u32> {
    match parse_value::<u32>(lookup, name)? {
        0 => {
            warn!(variable = name, "ignoring zero, value must be positive");
            None
        }
        value => Some(value),
    }
}
