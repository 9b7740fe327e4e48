//! # Configuration Module
//!
//! Runner settings loaded from environment variables (and a `.env` file when
//! present). Everything has a default, so an empty environment is valid.

use actorflow::{EngineConfig, InputMerge};
use anyhow::{Context, Result};
use std::env;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Runner configuration
///
/// | Variable                     | Field              | Default        |
/// |------------------------------|--------------------|----------------|
/// | `ACTORFLOW_MAILBOX_CAPACITY` | `mailbox_capacity` | unbounded      |
/// | `ACTORFLOW_INPUT_MERGE`      | `input_merge`      | `last_message` |
/// | `ACTORFLOW_LOG_LEVEL`        | `log_level`        | `info`         |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Capacity of every actor mailbox; None means unbounded
    pub mailbox_capacity: Option<usize>,

    /// How a vertex with several dependencies receives its input
    pub input_merge: InputMerge,

    /// Log filter directive (e.g. "info", "actorflow=debug")
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mailbox_capacity: None,
            input_merge: InputMerge::default(),
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Rust Concept: The ? Operator
    ///
    /// A malformed value aborts loading with an error naming the variable;
    /// an unset variable simply keeps the default.
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reading from any source
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(val) = lookup("ACTORFLOW_MAILBOX_CAPACITY") {
            let capacity: usize = val
                .trim()
                .parse()
                .context("ACTORFLOW_MAILBOX_CAPACITY must be a positive integer")?;
            // 0 means unbounded
            config.mailbox_capacity = (capacity > 0).then_some(capacity);
        }

        if let Some(val) = lookup("ACTORFLOW_INPUT_MERGE") {
            config.input_merge = val
                .parse()
                .map_err(anyhow::Error::msg)
                .context("ACTORFLOW_INPUT_MERGE must be 'last_message' or 'by_dependency'")?;
        }

        if let Some(val) = lookup("ACTORFLOW_LOG_LEVEL") {
            config.log_level = val;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.log_level.trim().is_empty() {
            anyhow::bail!("ACTORFLOW_LOG_LEVEL cannot be empty");
        }
        Ok(())
    }

    /// Engine settings derived from this configuration
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::default().with_input_merge(self.input_merge);
        match self.mailbox_capacity {
            Some(capacity) => config.with_mailbox_capacity(capacity),
            None => config.with_unbounded_mailboxes(),
        }
    }
}
