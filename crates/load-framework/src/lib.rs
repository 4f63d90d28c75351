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

#![allow(clippy::missing_errors_doc)]

pub mod harness;
pub mod kubernetes;
pub mod message;
pub mod metrics;
pub mod outcome;
pub mod transport;
pub mod utils;

use std::fmt::Display;

pub use anyhow;
pub use serde_json;

/// The MTA listener a load test is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Smtp,
}

impl TransportKind {
    /// How the synthetic message body describes the way it was sent.
    #[must_use]
    pub fn delivery_description(&self) -> &str {
        match self {
            TransportKind::Http => "HTTP API",
            TransportKind::Smtp => "SMTP",
        }
    }
}

impl Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Http => write!(f, "HTTP"),
            TransportKind::Smtp => write!(f, "SMTP"),
        }
    }
}
