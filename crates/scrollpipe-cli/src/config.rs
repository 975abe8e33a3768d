//! Configuration loading from TOML files

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scrollpipe_core::PipelineConfig;
use scrollpipe_elastic::{ElasticConfig, HttpSettings};
use serde::Deserialize;

/// Global configuration for scrollpipe
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub elastic: ElasticConfig,
    pub pipeline: PipelineSection,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub channel_capacity: usize,
    pub progress_interval: u64,
    /// Skip (and count) documents missing an output field instead of failing
    pub lenient_fields: bool,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            channel_capacity: defaults.channel_capacity.get(),
            progress_interval: defaults.progress_interval,
            lenient_fields: false,
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./scrollpipe.toml (current directory)
    /// 2. ~/.config/scrollpipe/config.toml
    ///
    /// If no config file found, returns default config (which fails validation).
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("scrollpipe.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "scrollpipe") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Validate all sections; any error here is fatal before the first request
    pub fn validate(&self) -> Result<()> {
        self.elastic.validate()?;
        self.pipeline_config()?;
        Ok(())
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let capacity = NonZeroUsize::new(self.pipeline.channel_capacity)
            .context("pipeline.channel_capacity must be positive")?;
        Ok(PipelineConfig {
            channel_capacity: capacity,
            progress_interval: self.pipeline.progress_interval,
        })
    }
}
