// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`LogService`] over the CloudWatch Logs JSON 1.1 protocol.
//!
//! Every call is a `POST /` whose action is named by the `X-Amz-Target`
//! header. Requests are not signed; point the endpoint at a signing proxy
//! or a local emulator.
//!
//! # Actions
//!
//! | Operation | Actions |
//! |---|---|
//! | `ensure_group` | `DescribeLogGroups`, then `CreateLogGroup` if missing |
//! | `ensure_stream` | `DescribeLogStreams`, then `CreateLogStream` if missing |
//! | `append_events` | `PutLogEvents` |
//!
//! # Errors
//!
//! Service error bodies carry the exception name in `__type`. Stale-token,
//! already-accepted and not-found exceptions get their own
//! [`LogServiceError`] variants; any other exception becomes
//! [`LogServiceError::Service`]. A non-2xx response without a parseable
//! body becomes [`LogServiceError::Status`].
//!
//! # Example
//!
//! ```rust,ignore
//! use logs_buffer::http::{HttpLogService, HttpLogServiceConfig};
//!
//! let service = HttpLogService::new(&HttpLogServiceConfig::new("http://localhost:4566"));
//! let buffer = LogBuffer::new(service, "app", "web-1", BufferConfig::default()).await?;
//! ```

use async_trait::async_trait;
use core::time::Duration;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::error::Error;
use tracing::{debug, error, warn};

use crate::error::LogServiceError;
use crate::event::LogEvent;
use crate::service::LogService;

const TARGET_PREFIX: &str = "Logs_20140328";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const RESOURCE_ALREADY_EXISTS: &str = "ResourceAlreadyExistsException";

/// Connection settings for [`HttpLogService`].
#[derive(Debug, Clone)]
pub struct HttpLogServiceConfig {
    /// Base URL of the service, e.g. `https://logs.us-east-1.amazonaws.com`
    pub endpoint: String,
    /// Per-request timeout, covering connect and response body
    pub timeout: Duration,
    /// HTTPS proxy URL; an unparseable value falls back to a direct connection
    pub https_proxy: Option<String>,
}

impl HttpLogServiceConfig {
    /// Settings for `endpoint` with a 5 second timeout and no proxy.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL of the service; a trailing `/` is ignored
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(5),
            https_proxy: None,
        }
    }
}

/// CloudWatch Logs client implementing [`LogService`].
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct HttpLogService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogService {
    /// Builds the client for `config`.
    ///
    /// # Returns
    ///
    /// A service ready for use. An invalid proxy is logged and skipped
    /// rather than reported, so construction never fails.
    #[must_use]
    pub fn new(config: &HttpLogServiceConfig) -> Self {
        HttpLogService {
            client: get_client(config),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn call<Req, Resp>(&self, action: &str, body: &Req) -> Result<Resp, LogServiceError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let resp = self
            .client
            .post(format!("{}/", self.endpoint))
            .header("X-Amz-Target", format!("{TARGET_PREFIX}.{action}"))
            .header("Content-Type", CONTENT_TYPE)
            .json(body)
            .send()
            .await
            .map_err(|e| LogServiceError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| LogServiceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(parse_service_error(status, &text));
        }

        // Create calls answer with an empty body
        let text = if text.trim().is_empty() { "{}" } else { &text };
        serde_json::from_str(text).map_err(|e| LogServiceError::Decode(e.to_string()))
    }
}

/// Creates the reqwest client with timeout, keep-alive and proxy settings.
///
/// If the proxy configuration is invalid, logs an error and returns a
/// client without proxy.
#[must_use]
fn get_client(config: &HttpLogServiceConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &HttpLogServiceConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceErrorBody {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    expected_sequence_token: Option<String>,
}

/// Maps a non-2xx response onto a [`LogServiceError`].
fn parse_service_error(status: StatusCode, body: &str) -> LogServiceError {
    let Ok(parsed) = serde_json::from_str::<ServiceErrorBody>(body) else {
        return LogServiceError::Status(status.as_u16(), body.to_string());
    };
    let Some(error_type) = parsed.error_type else {
        return LogServiceError::Status(status.as_u16(), body.to_string());
    };

    // `__type` may be namespaced, e.g. `com.amazonaws.logs#InvalidSequenceTokenException`
    let code = error_type
        .rsplit('#')
        .next()
        .unwrap_or(error_type.as_str())
        .to_string();
    let message = parsed.message.unwrap_or_default();

    match code.as_str() {
        "InvalidSequenceTokenException" => LogServiceError::InvalidSequenceToken {
            expected: parsed.expected_sequence_token,
            message,
        },
        "DataAlreadyAcceptedException" => LogServiceError::DataAlreadyAccepted {
            expected: parsed.expected_sequence_token,
            message,
        },
        "ResourceNotFoundException" => LogServiceError::ResourceNotFound(message),
        _ => LogServiceError::Service { code, message },
    }
}

fn is_already_exists(err: &LogServiceError) -> bool {
    matches!(err, LogServiceError::Service { code, .. } if code == RESOURCE_ALREADY_EXISTS)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsRequest<'a> {
    log_group_name_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogGroupsResponse {
    #[serde(default)]
    log_groups: Vec<LogGroupDescription>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogGroupDescription {
    log_group_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStreamDescription>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamDescription {
    log_stream_name: String,
    upload_sequence_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [LogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectedLogEventsInfo {
    too_new_log_event_start_index: Option<i64>,
    too_old_log_event_end_index: Option<i64>,
    expired_log_event_end_index: Option<i64>,
}

#[derive(Deserialize)]
struct EmptyResponse {}

#[async_trait]
impl LogService for HttpLogService {
    async fn ensure_group(&self, group: &str) -> Result<(), LogServiceError> {
        let mut next_token = None;
        loop {
            let page: DescribeLogGroupsResponse = self
                .call(
                    "DescribeLogGroups",
                    &DescribeLogGroupsRequest {
                        log_group_name_prefix: group,
                        next_token,
                    },
                )
                .await?;
            if page.log_groups.iter().any(|g| g.log_group_name == group) {
                return Ok(());
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!("LOGS | Creating log group {group}");
        match self
            .call::<_, EmptyResponse>(
                "CreateLogGroup",
                &CreateLogGroupRequest {
                    log_group_name: group,
                },
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn ensure_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        let mut next_token = None;
        loop {
            let page: DescribeLogStreamsResponse = self
                .call(
                    "DescribeLogStreams",
                    &DescribeLogStreamsRequest {
                        log_group_name: group,
                        log_stream_name_prefix: stream,
                        next_token,
                    },
                )
                .await?;
            if let Some(existing) = page
                .log_streams
                .into_iter()
                .find(|s| s.log_stream_name == stream)
            {
                return Ok(existing.upload_sequence_token);
            }
            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        debug!("LOGS | Creating log stream {group}/{stream}");
        match self
            .call::<_, EmptyResponse>(
                "CreateLogStream",
                &CreateLogStreamRequest {
                    log_group_name: group,
                    log_stream_name: stream,
                },
            )
            .await
        {
            Ok(_) => Ok(None),
            Err(e) if is_already_exists(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn append_events(
        &self,
        group: &str,
        stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, LogServiceError> {
        let resp: PutLogEventsResponse = self
            .call(
                "PutLogEvents",
                &PutLogEventsRequest {
                    log_group_name: group,
                    log_stream_name: stream,
                    log_events: events,
                    sequence_token,
                },
            )
            .await?;

        if let Some(rejected) = resp.rejected_log_events_info {
            warn!(
                "LOGS | Some events were rejected by {group}/{stream}: too new from {:?}, too old up to {:?}, expired up to {:?}",
                rejected.too_new_log_event_start_index,
                rejected.too_old_log_event_end_index,
                rejected.expired_log_event_end_index
            );
        }

        Ok(resp.next_sequence_token)
    }
}
