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

use std::time::Instant;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use super::{elapsed_ms, Transport, PROBE_TIMEOUT, SEND_TIMEOUT};
use crate::{
    message::{SyntheticMessage, SENDER_EMAIL, SENDER_NAME},
    outcome::{OutcomeRecord, TaskDescriptor},
    utils::truncate_chars,
    TransportKind,
};

pub const INJECT_PATH: &str = "/api/inject/v1";

/// Number of response body characters kept in a failure detail.
const ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
pub struct InjectRequest {
    pub envelope_sender: String,
    pub content: InjectContent,
    pub recipients: Vec<InjectRecipient>,
}

#[derive(Debug, Serialize)]
pub struct InjectContent {
    pub text_body: String,
    pub from: InjectFrom,
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct InjectFrom {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct InjectRecipient {
    pub email: String,
}

impl InjectRequest {
    #[must_use]
    pub fn for_task(task: &TaskDescriptor) -> Self {
        let message = SyntheticMessage::new(
            TransportKind::Http,
            task.sequence_number,
            &task.recipient_address,
        );
        Self {
            envelope_sender: SENDER_EMAIL.to_string(),
            content: InjectContent {
                text_body: message.text_body,
                from: InjectFrom {
                    email: SENDER_EMAIL.to_string(),
                    name: SENDER_NAME.to_string(),
                },
                subject: message.subject,
            },
            recipients: vec![InjectRecipient {
                email: task.recipient_address.clone(),
            }],
        }
    }
}

/// HTTP Basic credentials for the injection API.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Injects messages through the MTA's HTTP injection endpoint, one authenticated POST per message.
pub struct HttpInjector {
    client: Client,
    base_url: String,
    credentials: Credentials,
}

impl HttpInjector {
    /// `base_url` is the listener root, e.g. `http://localhost:8000`.
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .user_agent("mtaload/1.0")
            .timeout(SEND_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        })
    }

    #[must_use]
    pub fn inject_url(&self) -> String {
        format!("{}{INJECT_PATH}", self.base_url)
    }
}

/// Only 2xx responses count as an accepted injection.
#[must_use]
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), String> {
    if status.is_success() {
        Ok(())
    } else {
        Err(format!(
            "HTTP {}: {}",
            status.as_u16(),
            truncate_chars(body, ERROR_BODY_CHARS)
        ))
    }
}

#[async_trait]
impl Transport for HttpInjector {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn send(&self, task: &TaskDescriptor) -> OutcomeRecord {
        let payload = InjectRequest::for_task(task);
        let url = self.inject_url();

        let start = Instant::now();
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&payload)
            .send()
            .await;
        let elapsed = elapsed_ms(start);

        match response {
            Ok(response) => {
                let status = response.status();
                let body = if status.is_success() {
                    String::new()
                } else {
                    response.text().await.unwrap_or_default()
                };
                match classify_response(status, &body) {
                    Ok(()) => {
                        tracing::debug!(sequence = task.sequence_number, %status, "injection accepted");
                        OutcomeRecord::success(task, elapsed)
                    }
                    Err(detail) => {
                        tracing::debug!(sequence = task.sequence_number, %status, "injection rejected");
                        OutcomeRecord::failure(task, elapsed, detail)
                    }
                }
            }
            Err(e) => {
                tracing::debug!(sequence = task.sequence_number, error = %e, "injection request failed");
                OutcomeRecord::failure(task, elapsed, e.to_string())
            }
        }
    }

    async fn probe(&self) -> Result<()> {
        self.client
            .get(format!("{}/", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("HTTP listener at {} did not answer: {e}", self.base_url))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify_response() {
        assert!(classify_response(StatusCode::OK, "").is_ok());
        assert!(classify_response(StatusCode::ACCEPTED, "").is_ok());

        let detail = classify_response(StatusCode::SERVICE_UNAVAILABLE, "queue full")
            .expect_err("503 should fail");
        assert_eq!(detail, "HTTP 503: queue full");

        let long_body = "x".repeat(500);
        let detail = classify_response(StatusCode::BAD_REQUEST, &long_body)
            .expect_err("400 should fail");
        assert_eq!(detail.len(), "HTTP 400: ".len() + 200);

        assert!(classify_response(StatusCode::MULTIPLE_CHOICES, "").is_err());
    }

    #[test]
    fn test_inject_request_shape() {
        let task = TaskDescriptor::new(4, "test123@yahoo.com");
        let json = serde_json::to_value(InjectRequest::for_task(&task))
            .expect("payload should serialize");

        assert_eq!(json["envelope_sender"], SENDER_EMAIL);
        assert_eq!(json["content"]["from"]["email"], SENDER_EMAIL);
        assert_eq!(json["content"]["from"]["name"], SENDER_NAME);
        assert_eq!(json["recipients"][0]["email"], "test123@yahoo.com");
        assert_eq!(json["recipients"].as_array().map(Vec::len), Some(1));
        assert!(json["content"]["subject"]
            .as_str()
            .is_some_and(|s| s.starts_with("Performance Test #4 - ")));
        assert!(json["content"]["text_body"]
            .as_str()
            .is_some_and(|s| s.contains("sent via HTTP API.")));
    }

    #[test]
    fn test_inject_url_ignores_trailing_slash() {
        let injector = HttpInjector::new(
            "http://localhost:8000/",
            Credentials {
                username: "user1".to_string(),
                password: "secret".to_string(),
            },
        )
        .expect("client should build");
        assert_eq!(injector.inject_url(), "http://localhost:8000/api/inject/v1");
        assert!(!format!("{:?}", injector.credentials).contains("secret"));
    }
}
