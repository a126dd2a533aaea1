// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hard limits enforced by the remote log ingestion API.
//!
//! The `PutLogEvents` call rejects a request whose batch exceeds either of
//! these ceilings. Every [`BufferConfig`](crate::config::BufferConfig) is
//! validated against them, so a buffer can be tuned below the ceilings per
//! stream but never above.
//!
//! # API Constraints
//!
//! - **Batch bytes**: sum of the UTF-8 message sizes plus 26 bytes per event
//! - **Batch count**: maximum number of events in one append call

/// Maximum size in bytes of a single append request as counted by the service.
///
/// # Value: 1MB (1,048,576 bytes)
pub const MAX_BATCH_BYTES: usize = 1_024 * 1_024;

/// Maximum number of log events in a single append request.
///
/// # Value: 10,000 events
pub const MAX_BATCH_EVENTS: usize = 10_000;

/// Framing overhead the service charges for every event in a batch.
///
/// Only counted client-side when configured through
/// [`BufferConfig::per_event_overhead_bytes`](crate::config::BufferConfig::per_event_overhead_bytes).
pub const EVENT_OVERHEAD_BYTES: usize = 26;

/// Default byte ceiling used when the per-event overhead is not charged.
///
/// Leaves room for the framing of one event below [`MAX_BATCH_BYTES`].
pub const DEFAULT_MAX_BATCH_BYTES: usize = MAX_BATCH_BYTES - EVENT_OVERHEAD_BYTES;
