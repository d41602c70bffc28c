// used to read yank.toml and YANK_* environment overrides
use config::{Config, Environment, File};

use rand::Rng;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

pub const CONFIG_FILE: &str = "yank.toml";
pub const ENV_PREFIX: &str = "YANK";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub display: DisplaySettings,
    pub collect: CollectSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// In memory when absent.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { default_limit: 20, max_limit: 1000 }
    }
}

impl DisplaySettings {
    /// `0` and anything above the maximum both mean the maximum.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        if limit == 0 { self.max_limit.max(1) } else { limit.min(self.max_limit.max(1)) }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CollectSettings {
    pub throttle_ms: Throttle,
    pub auto_headers: bool,
    pub default_headers: HashMap<String, String>,
}

/// Pause before every fetch, in milliseconds. Written either as a number or
/// as a `[min, max]` pair to draw a random pause from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Throttle {
    Fixed(u64),
    Range(u64, u64),
}

impl Default for Throttle {
    fn default() -> Self {
        Throttle::Fixed(0)
    }
}

impl Throttle {
    pub fn delay(&self) -> Duration {
        let ms = match *self {
            Throttle::Fixed(ms) => ms,
            Throttle::Range(a, b) => rand::thread_rng().gen_range(a.min(b)..=a.max(b)),
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: "info".to_string() }
    }
}

impl Settings {
    /// Reads `yank.toml` from the working directory (or `path`), then
    /// `YANK_SECTION__KEY` environment variables on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
