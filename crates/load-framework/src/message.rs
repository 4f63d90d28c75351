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

//! Synthetic recipients and message content shared by every transport.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use rand::Rng;

use crate::{utils::get_random_element, TransportKind};

pub const SENDER_EMAIL: &str = "perf-test@talk.stir.com";
pub const SENDER_NAME: &str = "Performance Test";

/// Recipient domains. Spreading traffic across them keeps per-domain state in the MTA
/// from coupling the tasks of a run.
pub const RECIPIENT_DOMAINS: [&str; 3] = ["gmail.com", "yahoo.com", "hotmail.com"];

/// Generates a fresh `test<unix-seconds><nnnn>@<domain>` address.
#[must_use]
pub fn random_recipient() -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    let domain = get_random_element(&RECIPIENT_DOMAINS).unwrap_or(&RECIPIENT_DOMAINS[0]);
    format!("test{seconds}{suffix}@{domain}")
}

/// The subject and body of one synthetic message.
#[derive(Debug, Clone)]
pub struct SyntheticMessage {
    pub subject: String,
    pub text_body: String,
}

impl SyntheticMessage {
    #[must_use]
    pub fn new(kind: TransportKind, sequence_number: usize, recipient: &str) -> Self {
        let now = Local::now();
        let subject = format!(
            "Performance Test #{sequence_number} - {}",
            now.format("%Y%m%d-%H%M%S")
        );
        let text_body = format!(
            "Performance test message #{sequence_number}\n\
             \n\
             This is a performance test message sent via {}.\n\
             Timestamp: {}\n\
             Message ID: {sequence_number}\n\
             Recipient: {recipient}\n\
             \n\
             This message is used to test queues, spools and generate metrics.\n\
             Mode: SINK (messages will not be delivered)",
            kind.delivery_description(),
            now.format("%Y-%m-%d %H:%M:%S"),
        );

        Self { subject, text_body }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_random_recipient_shape() {
        for _ in 0..50 {
            let recipient = random_recipient();
            let (local, domain) = recipient
                .split_once('@')
                .expect("recipient should contain @");
            assert!(local.starts_with("test"));
            assert!(local[4..].chars().all(|c| c.is_ascii_digit()));
            assert!(RECIPIENT_DOMAINS.contains(&domain));
        }
    }

    #[test]
    fn test_message_mentions_sequence_and_recipient() {
        let message = SyntheticMessage::new(TransportKind::Smtp, 12, "x@gmail.com");
        assert!(message.subject.starts_with("Performance Test #12 - "));
        assert!(message.text_body.contains("sent via SMTP."));
        assert!(message.text_body.contains("Message ID: 12\n"));
        assert!(message.text_body.contains("Recipient: x@gmail.com\n"));
        assert!(message.text_body.ends_with("Mode: SINK (messages will not be delivered)"));
    }
}
