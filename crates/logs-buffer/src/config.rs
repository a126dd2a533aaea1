// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{DEFAULT_MAX_BATCH_BYTES, MAX_BATCH_BYTES, MAX_BATCH_EVENTS};
use crate::error::BufferError;
use std::env;
use std::str::FromStr;

/// What `put` does when the current batch cannot take another message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PutPolicy {
    /// Reject the message with a capacity error; the caller must flush first.
    Strict,
    /// Seal the current batch as pending and start a new one.
    #[default]
    AutoRollover,
}

impl FromStr for PutPolicy {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(PutPolicy::Strict),
            "auto_rollover" | "auto-rollover" | "rollover" => Ok(PutPolicy::AutoRollover),
            other => Err(BufferError::InvalidConfig(format!(
                "Invalid put policy '{other}'. Must be one of: strict, auto_rollover"
            ))),
        }
    }
}

/// Batching limits for one [`LogBuffer`](crate::buffer::LogBuffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Hard event ceiling per batch
    pub max_events_per_batch: usize,
    /// Hard byte ceiling per batch
    pub max_bytes_per_batch: usize,
    /// Event count at which `is_over_soft_limit` reports true
    pub soft_flush_events_threshold: usize,
    /// Byte size at which `is_over_soft_limit` reports true
    pub soft_flush_bytes_threshold: usize,
    /// Bytes charged per event on top of its message, 0 to count messages only
    pub per_event_overhead_bytes: usize,
    /// What `put` does when the current batch is full
    pub put_policy: PutPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_events_per_batch: MAX_BATCH_EVENTS,
            max_bytes_per_batch: DEFAULT_MAX_BATCH_BYTES,
            soft_flush_events_threshold: MAX_BATCH_EVENTS,
            soft_flush_bytes_threshold: DEFAULT_MAX_BATCH_BYTES,
            per_event_overhead_bytes: 0,
            put_policy: PutPolicy::default(),
        }
    }
}

impl BufferConfig {
    /// Config with the given hard limits and soft thresholds matching them.
    ///
    /// Overhead and put policy keep their defaults. The result is not
    /// validated; [`LogBuffer`](crate::buffer::LogBuffer) constructors do that.
    ///
    /// # Arguments
    ///
    /// * `max_events_per_batch` - Hard event ceiling, at most [`MAX_BATCH_EVENTS`]
    /// * `max_bytes_per_batch` - Hard byte ceiling, at most [`MAX_BATCH_BYTES`]
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = BufferConfig {
    ///     put_policy: PutPolicy::Strict,
    ///     ..BufferConfig::with_limits(500, 256 * 1024)
    /// };
    /// ```
    pub fn with_limits(max_events_per_batch: usize, max_bytes_per_batch: usize) -> Self {
        Self {
            max_events_per_batch,
            max_bytes_per_batch,
            soft_flush_events_threshold: max_events_per_batch,
            soft_flush_bytes_threshold: max_bytes_per_batch,
            ..Default::default()
        }
    }

    /// Create configuration from environment variables
    ///
    /// # Environment Variables
    ///
    /// - `LOGS_MAX_EVENTS_PER_BATCH`, `LOGS_MAX_BYTES_PER_BATCH`: hard limits
    /// - `LOGS_SOFT_FLUSH_EVENTS`, `LOGS_SOFT_FLUSH_BYTES`: soft thresholds,
    ///   default to the hard limits
    /// - `LOGS_EVENT_OVERHEAD_BYTES`: per-event overhead, default 0
    /// - `LOGS_PUT_POLICY`: `strict` or `auto_rollover`
    ///
    /// Unparseable numbers fall back to their defaults.
    pub fn from_env() -> Result<Self, BufferError> {
        let max_events_per_batch =
            parse_env_usize("LOGS_MAX_EVENTS_PER_BATCH").unwrap_or(MAX_BATCH_EVENTS);
        let max_bytes_per_batch =
            parse_env_usize("LOGS_MAX_BYTES_PER_BATCH").unwrap_or(DEFAULT_MAX_BATCH_BYTES);
        // Soft thresholds follow the hard limits unless set explicitly
        let soft_flush_events_threshold =
            parse_env_usize("LOGS_SOFT_FLUSH_EVENTS").unwrap_or(max_events_per_batch);
        let soft_flush_bytes_threshold =
            parse_env_usize("LOGS_SOFT_FLUSH_BYTES").unwrap_or(max_bytes_per_batch);
        let per_event_overhead_bytes = parse_env_usize("LOGS_EVENT_OVERHEAD_BYTES").unwrap_or(0);
        let put_policy = match env::var("LOGS_PUT_POLICY") {
            Ok(val) => val.parse()?,
            Err(_) => PutPolicy::default(),
        };

        let config = Self {
            max_events_per_batch,
            max_bytes_per_batch,
            soft_flush_events_threshold,
            soft_flush_bytes_threshold,
            per_event_overhead_bytes,
            put_policy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), BufferError> {
        if self.max_events_per_batch == 0 || self.max_bytes_per_batch == 0 {
            return Err(BufferError::InvalidConfig(
                "Batch limits must be greater than 0".to_string(),
            ));
        }

        if self.max_events_per_batch > MAX_BATCH_EVENTS {
            return Err(BufferError::InvalidConfig(format!(
                "max_events_per_batch {} exceeds the service ceiling of {MAX_BATCH_EVENTS}",
                self.max_events_per_batch
            )));
        }

        if self.max_bytes_per_batch > MAX_BATCH_BYTES {
            return Err(BufferError::InvalidConfig(format!(
                "max_bytes_per_batch {} exceeds the service ceiling of {MAX_BATCH_BYTES}",
                self.max_bytes_per_batch
            )));
        }

        if self.soft_flush_events_threshold == 0 || self.soft_flush_bytes_threshold == 0 {
            return Err(BufferError::InvalidConfig(
                "Soft flush thresholds must be greater than 0".to_string(),
            ));
        }

        if self.soft_flush_events_threshold > self.max_events_per_batch
            || self.soft_flush_bytes_threshold > self.max_bytes_per_batch
        {
            return Err(BufferError::InvalidConfig(
                "Soft flush thresholds cannot exceed the hard batch limits".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|val| val.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BufferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_events_per_batch, 10_000);
        assert_eq!(config.max_bytes_per_batch, 1_048_550);
        assert_eq!(config.put_policy, PutPolicy::AutoRollover);
    }

    #[test]
    fn test_with_limits_aligns_soft_thresholds() {
        let config = BufferConfig::with_limits(2, 100);
        assert_eq!(config.soft_flush_events_threshold, 2);
        assert_eq!(config.soft_flush_bytes_threshold, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_limits() {
        let config = BufferConfig::with_limits(0, 100);
        assert!(config.validate().is_err());

        let config = BufferConfig::with_limits(10, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_above_service_ceiling() {
        let config = BufferConfig::with_limits(MAX_BATCH_EVENTS + 1, 100);
        assert!(config.validate().is_err());

        let config = BufferConfig::with_limits(10, MAX_BATCH_BYTES + 1);
        assert!(config.validate().is_err());

        let config = BufferConfig::with_limits(MAX_BATCH_EVENTS, MAX_BATCH_BYTES);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_soft_above_hard() {
        let config = BufferConfig {
            soft_flush_events_threshold: 11,
            ..BufferConfig::with_limits(10, 100)
        };
        assert!(config.validate().is_err());

        let config = BufferConfig {
            soft_flush_bytes_threshold: 101,
            ..BufferConfig::with_limits(10, 100)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_put_policy_from_str() {
        assert_eq!("strict".parse::<PutPolicy>().unwrap(), PutPolicy::Strict);
        assert_eq!(
            " Auto_Rollover ".parse::<PutPolicy>().unwrap(),
            PutPolicy::AutoRollover
        );
        assert!("sometimes".parse::<PutPolicy>().is_err());
    }
}
