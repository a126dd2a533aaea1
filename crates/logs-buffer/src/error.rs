// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors returned by a [`LogService`](crate::service::LogService) implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogServiceError {
    /// The sequence token sent with an append did not match the stream's current token.
    #[error("Stale sequence token: {message}")]
    InvalidSequenceToken {
        expected: Option<String>,
        message: String,
    },

    /// The batch was already accepted by the stream in an earlier attempt.
    #[error("Batch already accepted: {message}")]
    DataAlreadyAccepted {
        expected: Option<String>,
        message: String,
    },

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Service error {code}: {message}")]
    Service { code: String, message: String },

    #[error("Unexpected status {0}: {1}")]
    Status(u16, String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Errors raised while writing or reading the local spill file.
#[derive(Debug, thiserror::Error)]
pub enum SpillError {
    #[error("Spill file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spill chunk could not be encoded or decoded: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Errors surfaced by [`LogBuffer`](crate::buffer::LogBuffer) operations.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to set up log group or stream: {0}")]
    Setup(#[source] LogServiceError),

    #[error(
        "Batch capacity exceeded: {count} events and {byte_size} bytes buffered, message needs {message_bytes} bytes"
    )]
    Capacity {
        count: usize,
        byte_size: usize,
        message_bytes: usize,
    },

    #[error("Failed to write batch after {batches_written} successful batches: {source}")]
    RemoteWrite {
        batches_written: usize,
        #[source]
        source: LogServiceError,
    },

    #[error("Local spill store failed: {0}")]
    LocalStore(#[from] SpillError),
}
