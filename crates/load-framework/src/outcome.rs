/*
Copyright 2024-2025 The Spice.ai OSS Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::fmt::Display;

use serde::Serialize;

/// One unit of work for the harness: send a single message to `recipient_address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub sequence_number: usize,
    pub recipient_address: String,
}

impl TaskDescriptor {
    #[must_use]
    pub fn new(sequence_number: usize, recipient_address: impl Into<String>) -> Self {
        Self {
            sequence_number,
            recipient_address: recipient_address.into(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Fail,
}

impl Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "SUCCESS"),
            OutcomeStatus::Fail => write!(f, "FAIL"),
        }
    }
}

/// The result of exactly one send attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeRecord {
    pub sequence_number: usize,
    pub status: OutcomeStatus,
    pub elapsed_ms: f64,
    pub recipient_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl OutcomeRecord {
    #[must_use]
    pub fn success(task: &TaskDescriptor, elapsed_ms: f64) -> Self {
        Self {
            sequence_number: task.sequence_number,
            status: OutcomeStatus::Success,
            elapsed_ms: elapsed_ms.max(0.0),
            recipient_address: task.recipient_address.clone(),
            error_detail: None,
        }
    }

    #[must_use]
    pub fn failure(task: &TaskDescriptor, elapsed_ms: f64, detail: impl Into<String>) -> Self {
        Self {
            sequence_number: task.sequence_number,
            status: OutcomeStatus::Fail,
            elapsed_ms: elapsed_ms.max(0.0),
            recipient_address: task.recipient_address.clone(),
            error_detail: Some(detail.into()),
        }
    }

    /// Recorded by the dispatcher when the worker running `task` died before
    /// producing its own record. No latency was measured.
    #[must_use]
    pub fn worker_fault(task: &TaskDescriptor, detail: impl Into<String>) -> Self {
        Self::failure(task, 0.0, detail)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_negative_elapsed_is_clamped() {
        let task = TaskDescriptor::new(3, "a@gmail.com");
        let record = OutcomeRecord::success(&task, -1.0);
        assert!((record.elapsed_ms - 0.0).abs() < f64::EPSILON);
        assert_eq!(record.sequence_number, 3);
    }

    #[test]
    fn test_worker_fault_is_a_zero_latency_failure() {
        let task = TaskDescriptor::new(7, "b@yahoo.com");
        let record = OutcomeRecord::worker_fault(&task, "task panicked");
        assert_eq!(record.status, OutcomeStatus::Fail);
        assert!((record.elapsed_ms - 0.0).abs() < f64::EPSILON);
        assert_eq!(record.recipient_address, "b@yahoo.com");
        assert_eq!(record.error_detail.as_deref(), Some("task panicked"));
    }

    #[test]
    fn test_status_serializes_uppercase() {
        let task = TaskDescriptor::new(1, "c@hotmail.com");
        let json = serde_json::to_value(OutcomeRecord::success(&task, 12.5))
            .expect("record should serialize");
        assert_eq!(json["status"], "SUCCESS");
        assert!(json.get("error_detail").is_none());
    }
}
