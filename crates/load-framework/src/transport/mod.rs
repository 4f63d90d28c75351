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

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;

use crate::{
    outcome::{OutcomeRecord, TaskDescriptor},
    TransportKind,
};

pub mod http;
pub mod smtp;

/// Upper bound on a single send, enforced by the transport client itself.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the reachability probe run before a test starts.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends one synthetic message per task to an MTA listener.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send the message described by `task`, timing the round-trip and classifying it.
    ///
    /// Infallible by contract: every transport or protocol fault is folded into a
    /// [`crate::outcome::OutcomeStatus::Fail`] record.
    async fn send(&self, task: &TaskDescriptor) -> OutcomeRecord;

    /// Check that the endpoint answers at all.
    async fn probe(&self) -> Result<()>;
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
