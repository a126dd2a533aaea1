// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod buffer;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod http;
pub mod service;
pub mod spill;

#[cfg(test)]
mod test_support;

pub use buffer::{FlushSummary, LogBuffer};
pub use config::{BufferConfig, PutPolicy};
pub use error::{BufferError, LogServiceError, SpillError};
pub use event::{Batch, LogEvent};
pub use http::HttpLogService;
pub use service::LogService;
