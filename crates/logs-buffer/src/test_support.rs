// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::LogServiceError;
use crate::event::LogEvent;
use crate::service::LogService;

/// In-memory log stream that checks sequence tokens the way the remote API does.
///
/// Each accepted append returns `token-<n>` where `n` counts accepted appends.
#[derive(Default)]
pub(crate) struct RecordingService {
    state: Mutex<RecordingState>,
}

#[derive(Default)]
pub(crate) struct RecordingState {
    pub accepted: Vec<Vec<LogEvent>>,
    pub attempts: usize,
    pub current_token: Option<String>,
    /// Errors keyed by 1-based append attempt
    pub failures: HashMap<usize, LogServiceError>,
    pub setup_error: Option<LogServiceError>,
    pub ensured: Vec<String>,
}

impl RecordingService {
    pub(crate) fn with_existing_token(token: &str) -> Self {
        let service = Self::default();
        service.state().current_token = Some(token.to_string());
        service
    }

    pub(crate) fn fail_attempt(&self, attempt: usize, error: LogServiceError) {
        self.state().failures.insert(attempt, error);
    }

    pub(crate) fn fail_setup(&self, error: LogServiceError) {
        self.state().setup_error = Some(error);
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn state(&self) -> std::sync::MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn accepted_messages(&self) -> Vec<Vec<String>> {
        self.state()
            .accepted
            .iter()
            .map(|batch| batch.iter().map(|e| e.message().to_string()).collect())
            .collect()
    }
}

#[async_trait]
impl LogService for RecordingService {
    async fn ensure_group(&self, group: &str) -> Result<(), LogServiceError> {
        let mut state = self.state();
        if let Some(error) = state.setup_error.clone() {
            return Err(error);
        }
        state.ensured.push(group.to_string());
        Ok(())
    }

    async fn ensure_stream(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        let mut state = self.state();
        state.ensured.push(format!("{group}/{stream}"));
        Ok(state.current_token.clone())
    }

    async fn append_events(
        &self,
        _group: &str,
        _stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, LogServiceError> {
        let mut state = self.state();
        state.attempts += 1;
        let attempt = state.attempts;
        if let Some(error) = state.failures.remove(&attempt) {
            return Err(error);
        }
        if sequence_token != state.current_token.as_deref() {
            return Err(LogServiceError::InvalidSequenceToken {
                expected: state.current_token.clone(),
                message: format!("The given sequenceToken is invalid: {sequence_token:?}"),
            });
        }
        assert!(!events.is_empty(), "empty batch submitted");
        state.accepted.push(events.to_vec());
        let next = format!("token-{}", state.accepted.len());
        state.current_token = Some(next.clone());
        Ok(Some(next))
    }
}
