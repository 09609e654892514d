//! # Logging
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over the
//! configured filter when it is set.

use std::io;
use tracing_subscriber::{fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{CoreError, CoreResult};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "warn")
    pub level: String,
    /// Emit one JSON object per event instead of text
    pub json_format: bool,
    /// Include the event target (module path) in text output
    pub include_target: bool,
    /// Environment filter (supports directives like "kit_migrate=debug,sqlx=warn")
    pub env_filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_target: false,
            env_filter: Some("info,sqlx=warn".to_string()),
        }
    }
}

impl LoggingConfig {
    /// Debug output for the kit crates, including ledger reads
    pub fn verbose() -> Self {
        Self {
            level: "debug".to_string(),
            include_target: true,
            env_filter: Some("kit_migrate=debug,kit_core=debug,kit_cli=debug,sqlx=warn".to_string()),
            ..Self::default()
        }
    }

    pub fn with_json(mut self, json_format: bool) -> Self {
        self.json_format = json_format;
        self
    }

    /// Set environment filter
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Directive used when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(&self.level)
    }
}

/// Initialize logging for the process.
///
/// Fails if the filter does not parse or a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> CoreResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))
        .map_err(|e| CoreError::logging(format!("invalid filter: {}", e)))?;

    let installed = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(Layer::new().with_writer(io::stdout).json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                Layer::new()
                    .with_writer(io::stdout)
                    .with_target(config.include_target),
            )
            .try_init()
    };
    installed.map_err(|e| CoreError::logging(e.to_string()))?;

    tracing::debug!(
        target: "kit::logging",
        "Logging initialized (level: {}, format: {})",
        config.level,
        if config.json_format { "JSON" } else { "text" }
    );

    Ok(())
}
