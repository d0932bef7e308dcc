use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Tuning knobs for the reader pipeline. All fields default so an empty YAML
/// document (or `ReaderConfig::default()`) is a working configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReaderConfig {
    /// Source files larger than this are rejected before decode.
    #[serde(default = "ReaderConfig::default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Hard cap on either texture dimension.
    #[serde(default = "ReaderConfig::default_max_texture_size")]
    pub max_texture_size: u32,

    /// Mip chain depth; limits resolution to 2^(count - 1).
    #[serde(default = "ReaderConfig::default_max_mip_count")]
    pub max_mip_count: u32,

    /// When false, both dimensions must be powers of two.
    #[serde(default = "ReaderConfig::default_allow_non_power_of_two")]
    pub allow_non_power_of_two: bool,

    /// How many construct tasks one drain pass may consume.
    #[serde(default = "ReaderConfig::default_construct_budget_per_tick")]
    pub construct_budget_per_tick: usize,

    /// How long flush sleeps between drain pumps.
    #[serde(
        default = "ReaderConfig::default_flush_poll_interval",
        with = "humantime_serde"
    )]
    pub flush_poll_interval: Duration,
}

impl ReaderConfig {
    fn default_max_file_size_bytes() -> u64 {
        999_999_999
    }

    fn default_max_texture_size() -> u32 {
        8192
    }

    fn default_max_mip_count() -> u32 {
        14
    }

    fn default_allow_non_power_of_two() -> bool {
        true
    }

    fn default_construct_budget_per_tick() -> usize {
        1
    }

    fn default_flush_poll_interval() -> Duration {
        Duration::from_millis(1)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_file_size_bytes > 0, "max-file-size-bytes must be positive");
        ensure!(self.max_texture_size > 0, "max-texture-size must be positive");
        ensure!(
            (1..=31).contains(&self.max_mip_count),
            "max-mip-count must be within 1..=31, got {}",
            self.max_mip_count
        );
        ensure!(
            self.construct_budget_per_tick > 0,
            "construct-budget-per-tick must be positive"
        );
        ensure!(
            self.flush_poll_interval > Duration::ZERO,
            "flush-poll-interval must be positive"
        );
        Ok(())
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: Self::default_max_file_size_bytes(),
            max_texture_size: Self::default_max_texture_size(),
            max_mip_count: Self::default_max_mip_count(),
            allow_non_power_of_two: Self::default_allow_non_power_of_two(),
            construct_budget_per_tick: Self::default_construct_budget_per_tick(),
            flush_poll_interval: Self::default_flush_poll_interval(),
        }
    }
}

pub fn from_yaml_file(path: &Path) -> Result<ReaderConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let cfg: ReaderConfig = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing config file {}", path.display()))?;
    Ok(cfg)
}
