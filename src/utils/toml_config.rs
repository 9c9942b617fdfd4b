//! TOML-based configuration for A.R.E.S Research
//!
//! Every table and field is optional; missing values fall back to the
//! `default_*` functions below. A missing `[[agents]]` list means the standard
//! crew is used for multi-agent runs.

use crate::agents::{AgentRoster, AgentSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure loaded from ares-research.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub research: ResearchSettings,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Multi-agent roster; empty means the standard crew
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<AgentSpec>,
}

// ============= Logging Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

// ============= Research Configuration =============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSettings {
    /// Default recursion depth for deep-recursive runs
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_max_breadth")]
    pub max_breadth: usize,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Section count cap for the multi-agent planner
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,

    #[serde(default = "default_max_review_rounds")]
    pub max_review_rounds: u32,

    /// Hard ceiling for any request's depth
    #[serde(default = "default_depth_cap")]
    pub depth_cap: u32,

    /// Hard ceiling for any request's breadth
    #[serde(default = "default_breadth_cap")]
    pub breadth_cap: usize,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_breadth: default_max_breadth(),
            max_concurrency: default_max_concurrency(),
            max_sections: default_max_sections(),
            max_review_rounds: default_max_review_rounds(),
            depth_cap: default_depth_cap(),
            breadth_cap: default_breadth_cap(),
        }
    }
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_breadth() -> usize {
    3
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_sections() -> usize {
    5
}

fn default_max_review_rounds() -> u32 {
    3
}

fn default_depth_cap() -> u32 {
    5
}

fn default_breadth_cap() -> usize {
    10
}

// ============= Retry Configuration =============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per gateway call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Deadline for a single gateway call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_call_timeout_secs() -> u64 {
    60
}

// ============= Source Configuration =============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_max_sources_per_task")]
    pub max_sources_per_task: usize,

    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,

    #[serde(default)]
    pub excluded_domains: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            max_sources_per_task: default_max_sources_per_task(),
            min_content_length: default_min_content_length(),
            excluded_domains: Vec::new(),
        }
    }
}

fn default_max_sources_per_task() -> usize {
    8
}

fn default_min_content_length() -> usize {
    100
}

// ============= Progress Configuration =============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Per-subscriber buffer; slower subscribers lose the oldest events
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Directory for JSON event logs. Absent disables the log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log_dir: Option<PathBuf>,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            event_log_dir: None,
        }
    }
}

fn default_channel_capacity() -> usize {
    256
}

// ============= Gateway Configuration =============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// Deterministic answers from a JSON fixture
    #[default]
    Replay,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub kind: GatewayKind,

    /// Fixture file for the replay gateway
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixture: Option<PathBuf>,
}

// ============= Errors =============

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ResearchConfig {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;

        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::FileNotFound(path)) => {
                tracing::warn!(path = %path.display(), "configuration file not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ResearchConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let research = &self.research;

        if research.max_breadth == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_breadth must be at least 1".to_string(),
            ));
        }
        if research.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_concurrency must be at least 1".to_string(),
            ));
        }
        if research.max_sections == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_sections must be at least 1".to_string(),
            ));
        }
        if research.max_review_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_review_rounds must be at least 1".to_string(),
            ));
        }
        if research.max_depth > research.depth_cap {
            return Err(ConfigError::ValidationError(format!(
                "research.max_depth ({}) exceeds research.depth_cap ({})",
                research.max_depth, research.depth_cap
            )));
        }
        if research.max_breadth > research.breadth_cap {
            return Err(ConfigError::ValidationError(format!(
                "research.max_breadth ({}) exceeds research.breadth_cap ({})",
                research.max_breadth, research.breadth_cap
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::ValidationError(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".to_string(),
            ));
        }
        if self.retry.call_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "retry.call_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.sources.max_sources_per_task == 0 {
            return Err(ConfigError::ValidationError(
                "sources.max_sources_per_task must be at least 1".to_string(),
            ));
        }
        if self.progress.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "progress.channel_capacity must be at least 1".to_string(),
            ));
        }

        if !self.agents.is_empty() {
            self.roster()
                .validate()
                .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }

        Ok(())
    }

    /// Roster for multi-agent runs
    pub fn roster(&self) -> AgentRoster {
        if self.agents.is_empty() {
            AgentRoster::standard()
        } else {
            AgentRoster::new(self.agents.clone())
        }
    }

    /// Pretty TOML rendering of the effective configuration
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
