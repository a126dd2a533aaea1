// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::LogServiceError;
use crate::event::LogEvent;

/// Remote append-only log stream API used by [`LogBuffer`](crate::buffer::LogBuffer).
///
/// Implementations must be idempotent for the setup calls: asking for a
/// group or stream that already exists is not an error.
#[async_trait]
pub trait LogService: Send + Sync {
    /// Creates the log group if it does not exist yet.
    async fn ensure_group(&self, group: &str) -> Result<(), LogServiceError>;

    /// Creates the log stream if it does not exist yet.
    /// Returns the stream's current sequence token when it already has entries.
    async fn ensure_stream(&self, group: &str, stream: &str)
        -> Result<Option<String>, LogServiceError>;

    /// Appends `events` (non-empty, in submission order) to the stream.
    /// `sequence_token` must be the token returned by the previous append.
    /// Returns the token to send with the next append.
    async fn append_events(
        &self,
        group: &str,
        stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, LogServiceError>;
}

#[async_trait]
impl<T: LogService + ?Sized> LogService for Arc<T> {
    async fn ensure_group(&self, group: &str) -> Result<(), LogServiceError> {
        (**self).ensure_group(group).await
    }

    async fn ensure_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        (**self).ensure_stream(group, stream).await
    }

    async fn append_events(
        &self,
        group: &str,
        stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, LogServiceError> {
        (**self)
            .append_events(group, stream, events, sequence_token)
            .await
    }
}
