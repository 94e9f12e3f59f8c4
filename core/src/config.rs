use std::path::{Path, PathBuf};
use std::result::Result as StdResult;
use std::time::Duration;

use anyhow::{ensure, Context as _};
use rust_embed::RustEmbed;
use serde::Deserialize;

use crate::command::{CommandTable, LanguageEntry};
use crate::testing::{Limits, VerdictMode, DEFAULT_DRAIN_TIMEOUT, DEFAULT_POLL_INTERVAL};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub source_config_file: Option<PathBuf>,
    pub judge: JudgeConfig,
    #[serde(default, rename = "language")]
    pub languages: Vec<LanguageEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JudgeConfig {
    pub exercises_dir: PathBuf,
    /// Seconds.
    pub time_limit: f64,
    /// Bytes.
    pub memory_limit: u64,
    #[serde(default = "JudgeConfig::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "JudgeConfig::default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
    #[serde(default)]
    pub verdict_mode: VerdictMode,
}

impl JudgeConfig {
    fn default_poll_interval_ms() -> u64 {
        DEFAULT_POLL_INTERVAL.as_millis() as u64
    }

    fn default_drain_timeout_ms() -> u64 {
        DEFAULT_DRAIN_TIMEOUT.as_millis() as u64
    }

    pub fn default_limits(&self) -> Limits {
        Limits::new(Duration::from_secs_f64(self.time_limit), self.memory_limit)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[derive(RustEmbed)]
#[folder = "assets/"]
struct Asset;

impl Config {
    pub const FILENAME: &str = "pjudge.toml";

    pub fn example_toml() -> anyhow::Result<String> {
        let file = Asset::get(Self::FILENAME).context("Builtin config is missing")?;
        let s = std::str::from_utf8(file.data.as_ref()).context("Builtin config is not UTF-8")?;
        Ok(s.to_owned())
    }

    pub fn builtin() -> anyhow::Result<Self> {
        let toml = Self::example_toml()?;
        let cfg = Self::from_toml(&toml).context("Invalid builtin config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml(s: &str) -> StdResult<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn from_toml_file(filepath: PathBuf) -> anyhow::Result<Self> {
        let toml = std::fs::read_to_string(&filepath)
            .with_context(|| format!("Cannot read config file {:?}", filepath))?;
        let mut cfg = Self::from_toml(&toml)
            .with_context(|| format!("Invalid config TOML: {:?}", filepath))?;
        cfg.validate()
            .with_context(|| format!("Invalid config: {:?}", filepath))?;
        cfg.source_config_file = Some(filepath);
        Ok(cfg)
    }

    /// Find config file in ancestor dirs, including current dir.
    pub fn find_file_in_ancestors(cur_dir: impl AsRef<Path>) -> Option<PathBuf> {
        cur_dir
            .as_ref()
            .ancestors()
            .map(|dir| dir.join(Self::FILENAME))
            .find(|path| path.is_file())
    }

    /// Config file found in ancestors of `cur_dir`, or the builtin one.
    pub fn load(cur_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        match Self::find_file_in_ancestors(cur_dir) {
            Some(path) => {
                log::info!("Using config {:?}", path);
                Self::from_toml_file(path)
            }
            None => {
                log::debug!("No {} found; using builtin config", Self::FILENAME);
                Self::builtin()
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let j = &self.judge;
        ensure!(
            j.time_limit.is_finite() && j.time_limit > 0.0,
            "judge.time_limit must be positive (got {})",
            j.time_limit
        );
        ensure!(j.memory_limit > 0, "judge.memory_limit must be positive");
        ensure!(j.poll_interval_ms > 0, "judge.poll_interval_ms must be positive");
        for lang in &self.languages {
            ensure!(
                !lang.extensions.is_empty() && !lang.run.is_empty(),
                "[[language]] entries need non-empty `extensions` and `run`"
            );
        }
        Ok(())
    }

    /// `judge.exercises_dir`, relative paths taken from the config file's dir.
    pub fn exercises_dir(&self) -> PathBuf {
        let dir = &self.judge.exercises_dir;
        match self.source_config_file.as_deref().and_then(Path::parent) {
            Some(base) if dir.is_relative() => base.join(dir),
            _ => dir.clone(),
        }
    }

    pub fn command_table(&self) -> CommandTable {
        CommandTable::new(self.languages.clone())
    }
}
