// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use logs_buffer::{BufferConfig, BufferError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Configuration for one replay run
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Base URL of the log service
    pub endpoint: String,
    pub group: String,
    pub stream: String,
    /// Spill file written by a buffer that could not flush
    pub spill_path: PathBuf,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    pub timeout: Duration,
    pub buffer: BufferConfig,
}

impl ReplayConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, BufferError> {
        Self::from_lookup(|key| env::var(key).ok(), BufferConfig::from_env()?)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        buffer: BufferConfig,
    ) -> Result<Self, BufferError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|val| !val.trim().is_empty())
                .ok_or_else(|| BufferError::InvalidConfig(format!("{key} must be set")))
        };

        let endpoint = required("LOGS_ENDPOINT")?;
        let group = required("LOGS_GROUP")?;
        let stream = required("LOGS_STREAM")?;
        let spill_path = PathBuf::from(required("LOGS_SPILL_PATH")?);
        let log_level = lookup("LOGS_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|| "info".to_string());
        let https_proxy = lookup("LOGS_HTTPS_PROXY").or_else(|| lookup("HTTPS_PROXY"));
        let timeout = lookup("LOGS_TIMEOUT_SECS")
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let config = Self {
            endpoint,
            group,
            stream,
            spill_path,
            log_level,
            https_proxy,
            timeout,
            buffer,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BufferError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(BufferError::InvalidConfig(format!(
                "LOGS_ENDPOINT must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(BufferError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        self.buffer.validate()
    }
}
