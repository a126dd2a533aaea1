// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching buffer in front of a sequence-token ordered log stream.
//!
//! # Batching Strategy
//!
//! Messages are appended to the *current* batch until one of two hard limits
//! would be crossed:
//! 1. **Count limit**: `max_events_per_batch` events
//! 2. **Size limit**: `max_bytes_per_batch` charged bytes (message bytes plus
//!    the configured per-event overhead)
//!
//! What happens next depends on the [`PutPolicy`]:
//!
//! ```text
//!   put("CCC") with max_events_per_batch = 2
//!
//!   AutoRollover:  pending: [AAA,BBB]    current: [CCC]
//!   Strict:        Err(Capacity)         current: [AAA,BBB]  (unchanged)
//! ```
//!
//! # Flushing
//!
//! [`LogBuffer::flush`] seals the current batch and submits every pending
//! batch in order, sending the sequence token returned by each append with
//! the next one. The first failure stops the flush: the failed batch and
//! everything after it stay pending, so the next flush resumes exactly where
//! this one stopped and ordering on the stream is preserved.
//!
//! # Spilling
//!
//! When the remote service stays unavailable, [`LogBuffer::spill_to_file`]
//! moves every buffered event to a local file and empties the buffer. A
//! later process can [`LogBuffer::load_from_file`] into a fresh buffer and
//! flush again; original timestamps are kept.

use std::collections::VecDeque;
use std::path::Path;
use tracing::{debug, error, warn};

use crate::config::{BufferConfig, PutPolicy};
use crate::error::{BufferError, LogServiceError};
use crate::event::{Batch, LogEvent};
use crate::service::LogService;
use crate::spill;

/// Outcome of a successful [`LogBuffer::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    /// Batches acknowledged by the stream
    pub batches_written: usize,
    /// Events in those batches
    pub events_written: usize,
}

/// Buffers log events for one log stream and ships them in bounded batches.
///
/// The buffer is a single-owner state machine: `put` and the predicates are
/// synchronous, `flush` awaits one append at a time. Callers sharing a
/// buffer between tasks must serialize access themselves, e.g. behind a
/// `tokio::sync::Mutex`.
///
/// # Example
///
/// ```rust,ignore
/// let mut buffer = LogBuffer::new(service, "app", "web-1", BufferConfig::default()).await?;
///
/// buffer.put("AAA")?.put("BBB")?.put("CCC")?;
///
/// if buffer.is_over_soft_limit() || buffer.has_pending_batches() {
///     buffer.flush().await?;
/// }
/// ```
#[derive(Debug)]
pub struct LogBuffer<S: LogService> {
    service: S,
    group: String,
    stream: String,
    config: BufferConfig,
    /// Sealed batches waiting to be submitted, oldest first.
    pending: VecDeque<Batch>,
    /// Batch receiving new events.
    current: Batch,
    /// Token returned by the last successful append, sent with the next one.
    sequence_token: Option<String>,
}

impl<S: LogService> LogBuffer<S> {
    /// Creates a buffer for `group`/`stream`, creating both remotely if needed.
    ///
    /// When the stream already holds events its current sequence token is
    /// recovered so the first append is accepted.
    ///
    /// # Errors
    ///
    /// - [`BufferError::InvalidConfig`] if `config` fails validation
    /// - [`BufferError::Setup`] if the group or stream could not be ensured
    pub async fn new(
        service: S,
        group: impl Into<String>,
        stream: impl Into<String>,
        config: BufferConfig,
    ) -> Result<Self, BufferError> {
        config.validate()?;
        let group = group.into();
        let stream = stream.into();

        service
            .ensure_group(&group)
            .await
            .map_err(BufferError::Setup)?;
        let sequence_token = service
            .ensure_stream(&group, &stream)
            .await
            .map_err(BufferError::Setup)?;

        debug!(
            "LOGS | Buffer ready for {group}/{stream}, existing sequence token: {}",
            sequence_token.is_some()
        );

        Ok(Self::from_parts(
            service,
            group,
            stream,
            config,
            sequence_token,
        ))
    }

    /// Creates a buffer without contacting the service.
    ///
    /// Use when the group and stream are known to exist and `sequence_token`
    /// is the stream's current token (or `None` for an empty stream).
    pub fn with_sequence_token(
        service: S,
        group: impl Into<String>,
        stream: impl Into<String>,
        config: BufferConfig,
        sequence_token: Option<String>,
    ) -> Result<Self, BufferError> {
        config.validate()?;
        Ok(Self::from_parts(
            service,
            group.into(),
            stream.into(),
            config,
            sequence_token,
        ))
    }

    fn from_parts(
        service: S,
        group: String,
        stream: String,
        config: BufferConfig,
        sequence_token: Option<String>,
    ) -> Self {
        LogBuffer {
            service,
            group,
            stream,
            config,
            pending: VecDeque::new(),
            current: Batch::new(),
            sequence_token,
        }
    }

    /// Buffers `message` stamped with the current time.
    ///
    /// Returns the buffer so calls can be chained with `?`.
    ///
    /// # Errors
    ///
    /// [`BufferError::Capacity`] under [`PutPolicy::Strict`] when the current
    /// batch cannot take the message. The buffer is left unchanged.
    pub fn put(&mut self, message: impl Into<String>) -> Result<&mut Self, BufferError> {
        self.put_event(LogEvent::new(message))
    }

    /// Buffers `message` with an explicit timestamp in Unix milliseconds.
    ///
    /// # Arguments
    ///
    /// * `message` - Log line, stored as is
    /// * `timestamp_millis` - Milliseconds since the Unix epoch, as sent to the stream
    ///
    /// # Errors
    ///
    /// Same as [`LogBuffer::put`].
    pub fn put_with_timestamp(
        &mut self,
        message: impl Into<String>,
        timestamp_millis: i64,
    ) -> Result<&mut Self, BufferError> {
        self.put_event(LogEvent::with_timestamp(message, timestamp_millis))
    }

    /// Buffers an already built event.
    pub fn put_event(&mut self, event: LogEvent) -> Result<&mut Self, BufferError> {
        let charged = self.charged_bytes(&event);
        match self.config.put_policy {
            PutPolicy::Strict => {
                if !self.fits(charged) {
                    return Err(BufferError::Capacity {
                        count: self.current.count(),
                        byte_size: self.current.byte_size(),
                        message_bytes: charged,
                    });
                }
                self.current.push(event, charged);
            }
            PutPolicy::AutoRollover => self.push_rolling(event, charged),
        }
        Ok(self)
    }

    fn charged_bytes(&self, event: &LogEvent) -> usize {
        event.message_bytes() + self.config.per_event_overhead_bytes
    }

    /// Whether the current batch can take `charged` more bytes and one more event.
    fn fits(&self, charged: usize) -> bool {
        self.current.count() < self.config.max_events_per_batch
            && self.current.byte_size() + charged <= self.config.max_bytes_per_batch
    }

    fn push_rolling(&mut self, event: LogEvent, charged: usize) {
        if !self.fits(charged) {
            // An oversized message still goes alone into a fresh batch, never split
            self.seal_current();
        }
        if charged > self.config.max_bytes_per_batch {
            warn!(
                "LOGS | Message of {} bytes exceeds the batch limit of {} bytes, the service may reject its batch",
                charged, self.config.max_bytes_per_batch
            );
        }
        self.current.push(event, charged);
    }

    /// Moves a non-empty current batch to the back of the pending queue.
    fn seal_current(&mut self) {
        if !self.current.is_empty() {
            self.pending.push_back(std::mem::take(&mut self.current));
        }
    }

    /// Whether the current batch reached the hard event or byte limit.
    pub fn is_full(&self) -> bool {
        self.current.count() >= self.config.max_events_per_batch
            || self.current.byte_size() >= self.config.max_bytes_per_batch
    }

    /// Whether the current batch reached either soft flush threshold.
    pub fn is_over_soft_limit(&self) -> bool {
        self.current.count() >= self.config.soft_flush_events_threshold
            || self.current.byte_size() >= self.config.soft_flush_bytes_threshold
    }

    /// Whether sealed batches are waiting for a flush.
    pub fn has_pending_batches(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether no event is buffered, pending or current.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.current.is_empty()
    }

    /// Number of events buffered across pending and current batches.
    pub fn buffered_events(&self) -> usize {
        self.pending.iter().map(Batch::count).sum::<usize>() + self.current.count()
    }

    /// Sealed batches in submission order, oldest first.
    ///
    /// After a failed flush the front batch is the one that failed.
    pub fn pending_batches(&self) -> &VecDeque<Batch> {
        &self.pending
    }

    /// Batch currently receiving events; may be empty.
    pub fn current_batch(&self) -> &Batch {
        &self.current
    }

    /// Token that will be sent with the next append.
    ///
    /// `None` for a stream that has never been written to, or after an
    /// append response that carried no next token.
    pub fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }

    /// Validated limits this buffer batches with
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Log group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Log stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Submits every buffered batch to the stream, oldest first.
    ///
    /// Each successful append removes its batch and replaces the sequence
    /// token with the one the service returned.
    ///
    /// # Returns
    ///
    /// A [`FlushSummary`] counting the batches and events written. Flushing
    /// an empty buffer makes no remote call and returns an empty summary.
    ///
    /// # Errors
    ///
    /// [`BufferError::RemoteWrite`] on the first failed append. Batches
    /// written before it are gone from the buffer; the failed batch and all
    /// later ones stay pending for the next call.
    ///
    /// On a stale-token rejection ([`LogServiceError::InvalidSequenceToken`])
    /// or an already-accepted rejection ([`LogServiceError::DataAlreadyAccepted`])
    /// the token the service expects, when reported, is adopted. After an
    /// already-accepted rejection the batch is still pending: the caller
    /// decides whether to drop it with [`LogBuffer::discard_front_batch`]
    /// or to flush it again.
    pub async fn flush(&mut self) -> Result<FlushSummary, BufferError> {
        self.seal_current();

        let mut summary = FlushSummary::default();
        if self.pending.is_empty() {
            return Ok(summary);
        }

        debug!(
            "LOGS | Flushing {} batches to {}/{}",
            self.pending.len(),
            self.group,
            self.stream
        );

        while let Some(batch) = self.pending.front() {
            let result = self
                .service
                .append_events(
                    &self.group,
                    &self.stream,
                    batch.events(),
                    self.sequence_token.as_deref(),
                )
                .await;

            match result {
                Ok(next_token) => {
                    self.sequence_token = next_token;
                }
                Err(err) => {
                    if let LogServiceError::InvalidSequenceToken {
                        expected: Some(expected),
                        ..
                    }
                    | LogServiceError::DataAlreadyAccepted {
                        expected: Some(expected),
                        ..
                    } = &err
                    {
                        self.sequence_token = Some(expected.clone());
                    }
                    error!(
                        "LOGS | Failed to write batch {} of {} to {}/{}: {err}",
                        summary.batches_written + 1,
                        summary.batches_written + self.pending.len(),
                        self.group,
                        self.stream
                    );
                    return Err(BufferError::RemoteWrite {
                        batches_written: summary.batches_written,
                        source: err,
                    });
                }
            }

            if let Some(written) = self.pending.pop_front() {
                summary.batches_written += 1;
                summary.events_written += written.count();
            }
        }

        debug!(
            "LOGS | Flushed {} events in {} batches",
            summary.events_written, summary.batches_written
        );
        Ok(summary)
    }

    /// Removes the oldest pending batch without submitting it.
    ///
    /// Meant for a batch the stream reported as already accepted after a
    /// failed [`flush`](LogBuffer::flush). The current batch is never touched.
    ///
    /// # Returns
    ///
    /// The removed batch, or `None` when nothing is pending.
    pub fn discard_front_batch(&mut self) -> Option<Batch> {
        let discarded = self.pending.pop_front();
        if let Some(batch) = &discarded {
            warn!(
                "LOGS | Discarded a pending batch of {} events for {}/{}",
                batch.count(),
                self.group,
                self.stream
            );
        }
        discarded
    }

    /// Appends every buffered event to the spill file at `path` and empties the buffer.
    ///
    /// Events keep their original order and timestamps. The sequence token is
    /// kept. Returns the number of events spilled.
    ///
    /// # Errors
    ///
    /// [`BufferError::LocalStore`] if the chunk could not be encoded or
    /// written; the buffer is left untouched and the file is cut back to
    /// its previous length.
    pub fn spill_to_file(&mut self, path: impl AsRef<Path>) -> Result<usize, BufferError> {
        let events: Vec<LogEvent> = self
            .pending
            .iter()
            .chain(std::iter::once(&self.current))
            .flat_map(|batch| batch.events().iter().cloned())
            .collect();

        spill::append_to_file(path.as_ref(), &events)?;

        self.pending.clear();
        self.current = Batch::new();
        debug!(
            "LOGS | Spilled {} events to {}",
            events.len(),
            path.as_ref().display()
        );
        Ok(events.len())
    }

    /// Buffers every event from the spill file at `path`, keeping their timestamps.
    ///
    /// Batches roll over on capacity whatever the [`PutPolicy`], so a file
    /// holding more than one batch loads completely. Returns the number of
    /// events loaded.
    ///
    /// # Errors
    ///
    /// [`BufferError::LocalStore`] if the file cannot be read; nothing is
    /// buffered in that case. A chunk left incomplete by an interrupted
    /// spill is skipped with a warning and the other chunks still load.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize, BufferError> {
        let events = spill::read_from_file(path.as_ref())?;
        let loaded = events.len();
        for event in events {
            let charged = self.charged_bytes(&event);
            self.push_rolling(event, charged);
        }
        debug!(
            "LOGS | Loaded {loaded} events from {}",
            path.as_ref().display()
        );
        Ok(loaded)
    }
}
