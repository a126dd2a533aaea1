// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use logs_buffer::http::{HttpLogService, HttpLogServiceConfig};
use logs_buffer::{BufferError, FlushSummary, LogBuffer, LogService, SpillError};

use crate::config::ReplayConfig;

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = std::env::var("LOGS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match ReplayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating replay config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let service = HttpLogService::new(&HttpLogServiceConfig {
        endpoint: config.endpoint.clone(),
        timeout: config.timeout,
        https_proxy: config.https_proxy.clone(),
    });

    match replay(service, &config).await {
        Ok(summary) => {
            info!(
                "Replayed {} events in {} batches to {}/{}",
                summary.events_written, summary.batches_written, config.group, config.stream
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Replay failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Loads the spill file into a fresh buffer and flushes it.
///
/// On success the spill file is truncated. On a failed flush the spill file
/// is replaced by the events the stream did not acknowledge, so running the
/// replay again on the same path resumes after the last written batch.
async fn replay<S: LogService>(
    service: S,
    config: &ReplayConfig,
) -> Result<FlushSummary, BufferError> {
    if !config.spill_path.exists() {
        info!(
            "Nothing to replay: {} does not exist",
            config.spill_path.display()
        );
        return Ok(FlushSummary::default());
    }

    let mut buffer = LogBuffer::new(
        service,
        config.group.as_str(),
        config.stream.as_str(),
        config.buffer.clone(),
    )
    .await?;

    let loaded = buffer.load_from_file(&config.spill_path)?;
    debug!(
        "Loaded {loaded} events in {} batches",
        buffer.pending_batches().len() + usize::from(!buffer.current_batch().is_empty())
    );

    match buffer.flush().await {
        Ok(summary) => {
            truncate(&config.spill_path)?;
            Ok(summary)
        }
        Err(e) => {
            let unsent = rewrite_unsent(&mut buffer, &config.spill_path)?;
            error!(
                "{unsent} unsent events kept in {}",
                config.spill_path.display()
            );
            Err(e)
        }
    }
}

/// Replaces the spill file at `spill_path` with the events still in `buffer`.
///
/// The events are spilled next to it first and renamed over it, so the
/// original file is only replaced once the new one is complete.
fn rewrite_unsent<S: LogService>(
    buffer: &mut LogBuffer<S>,
    spill_path: &Path,
) -> Result<usize, BufferError> {
    let staging = staging_path(spill_path);
    match fs::remove_file(&staging) {
        Err(e) if e.kind() != ErrorKind::NotFound => return Err(SpillError::from(e).into()),
        _ => {}
    }

    let unsent = buffer.spill_to_file(&staging)?;
    if unsent == 0 {
        truncate(spill_path)?;
    } else {
        fs::rename(&staging, spill_path).map_err(SpillError::from)?;
    }
    Ok(unsent)
}

fn staging_path(spill_path: &Path) -> PathBuf {
    let mut path = OsString::from(spill_path.as_os_str());
    path.push(".unsent");
    PathBuf::from(path)
}

fn truncate(path: &Path) -> Result<(), BufferError> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(SpillError::from)?;
    Ok(())
}
