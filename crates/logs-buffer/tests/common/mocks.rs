// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock log service for exercising the buffer without a network

use async_trait::async_trait;
use logs_buffer::{LogEvent, LogService, LogServiceError};
use std::sync::Mutex;

/// Log stream that accepts appends carrying the current token and can fail one attempt
#[derive(Default)]
pub struct MockLogService {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    submitted: Vec<Vec<LogEvent>>,
    returned_tokens: Vec<String>,
    attempts: usize,
    fail_attempt: Option<usize>,
}

#[allow(dead_code)]
impl MockLogService {
    pub fn failing_on_attempt(attempt: usize) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().fail_attempt = Some(attempt);
        service
    }

    pub fn submitted(&self) -> Vec<Vec<LogEvent>> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn last_returned_token(&self) -> Option<String> {
        self.state.lock().unwrap().returned_tokens.last().cloned()
    }
}

#[async_trait]
impl LogService for MockLogService {
    async fn ensure_group(&self, _group: &str) -> Result<(), LogServiceError> {
        Ok(())
    }

    async fn ensure_stream(
        &self,
        _group: &str,
        _stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        Ok(None)
    }

    async fn append_events(
        &self,
        _group: &str,
        _stream: &str,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, LogServiceError> {
        let mut state = self.state.lock().unwrap();
        state.attempts += 1;
        if state.fail_attempt == Some(state.attempts) {
            return Err(LogServiceError::Transport("connection reset".to_string()));
        }
        let expected = state.returned_tokens.last().map(String::as_str);
        if sequence_token != expected {
            return Err(LogServiceError::InvalidSequenceToken {
                expected: expected.map(str::to_string),
                message: "The given sequenceToken is invalid".to_string(),
            });
        }
        state.submitted.push(events.to_vec());
        let next = format!("seq-{:04}", state.submitted.len());
        state.returned_tokens.push(next.clone());
        Ok(Some(next))
    }
}
