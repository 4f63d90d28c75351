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

//! SMTP submission, one session per message.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    Message,
};
use snafu::prelude::*;

use super::{elapsed_ms, Transport, PROBE_TIMEOUT, SEND_TIMEOUT};
use crate::{
    message::{SyntheticMessage, SENDER_EMAIL, SENDER_NAME},
    outcome::{OutcomeRecord, TaskDescriptor},
    TransportKind,
};

mod lettre_session;
pub use lettre_session::{LettreConnector, LettreSession};

#[derive(Debug, Snafu)]
pub enum TransferError {
    #[snafu(display("Recipients refused: {recipients}"))]
    RecipientsRefused { recipients: String },

    #[snafu(display("Data error: {message}"))]
    Data { code: Option<u16>, message: String },

    #[snafu(display("SMTP error: {message}"))]
    Protocol { message: String },

    #[snafu(display("Connection error: {message}"))]
    Connection { message: String },

    #[snafu(display("Unexpected error: {message}"))]
    Unexpected { message: String },
}

/// An open SMTP session.
pub trait SmtpSession: Send {
    /// Run one `MAIL FROM` / `RCPT TO` / `DATA` exchange.
    ///
    /// Returns the recipients the server refused; an empty list means full acceptance.
    /// Fails with [`TransferError::RecipientsRefused`] when no recipient was accepted.
    fn transfer(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<Vec<String>, TransferError>;

    /// Graceful termination (`QUIT`).
    fn quit(&mut self) -> Result<(), TransferError>;

    /// Abrupt termination, used when [`SmtpSession::quit`] fails.
    fn close(&mut self);
}

/// Opens sessions against one SMTP listener.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: SmtpSession;

    fn connect(&self, timeout: Duration) -> Result<Self::Session, TransferError>;
}

/// Owns an open session and terminates it exactly once when dropped, including while unwinding:
/// `QUIT` first, falling back to [`SmtpSession::close`] if that fails.
pub struct SessionGuard<S: SmtpSession> {
    session: S,
}

impl<S: SmtpSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    pub fn transfer(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<Vec<String>, TransferError> {
        self.session.transfer(sender, recipients, message)
    }
}

impl<S: SmtpSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        if let Err(e) = self.session.quit() {
            tracing::debug!(error = %e, "QUIT failed, closing the session");
            self.session.close();
        }
    }
}

/// Decide whether a transfer counts as a delivered message.
///
/// Some servers surface an accepted message as a data-phase error carrying a 250/251 reply.
/// Those two codes, and only those, are treated as success.
pub fn classify_transfer(result: &Result<Vec<String>, TransferError>) -> Result<(), String> {
    match result {
        Ok(refused) if refused.is_empty() => Ok(()),
        Ok(refused) => Err(format!("Recipients refused: {}", refused.join(", "))),
        Err(TransferError::Data {
            code: Some(250 | 251),
            ..
        }) => Ok(()),
        Err(e) => Err(e.to_string()),
    }
}

/// Render the MIME message for `task`.
pub fn build_message(task: &TaskDescriptor) -> Result<Vec<u8>, TransferError> {
    let content = SyntheticMessage::new(
        TransportKind::Smtp,
        task.sequence_number,
        &task.recipient_address,
    );

    let from = Mailbox::new(
        Some(SENDER_NAME.to_string()),
        SENDER_EMAIL.parse().map_err(|e| TransferError::Unexpected {
            message: format!("invalid sender address {SENDER_EMAIL}: {e}"),
        })?,
    );
    let to: Mailbox = task
        .recipient_address
        .parse()
        .map_err(|e| TransferError::Unexpected {
            message: format!("invalid recipient address {}: {e}", task.recipient_address),
        })?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(content.subject)
        .header(ContentType::TEXT_PLAIN)
        .body(content.text_body)
        .map_err(|e| TransferError::Unexpected {
            message: format!("failed to build message: {e}"),
        })?;

    Ok(message.formatted())
}

/// Submits messages over SMTP through sessions opened by `C`.
pub struct SmtpSender<C: SessionConnector> {
    connector: Arc<C>,
}

impl<C: SessionConnector> SmtpSender<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }
}

impl SmtpSender<LettreConnector> {
    #[must_use]
    pub fn to_listener(host: impl Into<String>, port: u16) -> Self {
        Self::new(LettreConnector::new(host, port))
    }
}

/// The blocking body of one send: connect, transfer, terminate.
///
/// Elapsed time covers connect and transfer; session teardown is not measured.
fn deliver<C: SessionConnector>(connector: &C, task: &TaskDescriptor) -> OutcomeRecord {
    let message = match build_message(task) {
        Ok(message) => message,
        Err(e) => return OutcomeRecord::failure(task, 0.0, e.to_string()),
    };

    let start = Instant::now();
    let session = match connector.connect(SEND_TIMEOUT) {
        Ok(session) => session,
        Err(e) => return OutcomeRecord::failure(task, elapsed_ms(start), e.to_string()),
    };

    let mut guard = SessionGuard::new(session);
    let result = guard.transfer(
        SENDER_EMAIL,
        std::slice::from_ref(&task.recipient_address),
        &message,
    );
    let elapsed = elapsed_ms(start);
    drop(guard);

    match classify_transfer(&result) {
        Ok(()) => OutcomeRecord::success(task, elapsed),
        Err(detail) => {
            tracing::debug!(sequence = task.sequence_number, %detail, "SMTP transfer failed");
            OutcomeRecord::failure(task, elapsed, detail)
        }
    }
}

#[async_trait]
impl<C: SessionConnector> Transport for SmtpSender<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::Smtp
    }

    async fn send(&self, task: &TaskDescriptor) -> OutcomeRecord {
        let connector = Arc::clone(&self.connector);
        let owned_task = task.clone();
        let start = Instant::now();

        match tokio::task::spawn_blocking(move || deliver(connector.as_ref(), &owned_task)).await {
            Ok(record) => record,
            Err(e) => OutcomeRecord::failure(
                task,
                elapsed_ms(start),
                TransferError::Unexpected {
                    message: e.to_string(),
                }
                .to_string(),
            ),
        }
    }

    async fn probe(&self) -> Result<()> {
        let connector = Arc::clone(&self.connector);
        tokio::task::spawn_blocking(move || {
            connector
                .connect(PROBE_TIMEOUT)
                .map(|session| drop(SessionGuard::new(session)))
        })
        .await?
        .map_err(|e| anyhow!("SMTP listener did not answer: {e}"))
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[derive(Clone, Copy)]
    enum Behavior {
        Accept,
        RefuseAll,
        DataReply(u16),
        PanicDuringTransfer,
        RefuseConnection,
        AcceptButQuitFails,
    }

    #[derive(Default)]
    struct Counters {
        connects: AtomicUsize,
        quits: AtomicUsize,
        failed_quits: AtomicUsize,
        closes: AtomicUsize,
    }

    impl Counters {
        /// Sessions that ended either through a successful QUIT or an abrupt close.
        fn terminations(&self) -> usize {
            self.quits.load(Ordering::SeqCst) - self.failed_quits.load(Ordering::SeqCst)
                + self.closes.load(Ordering::SeqCst)
        }
    }

    struct FakeConnector {
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    struct FakeSession {
        behavior: Behavior,
        counters: Arc<Counters>,
    }

    impl SessionConnector for FakeConnector {
        type Session = FakeSession;

        fn connect(&self, _timeout: Duration) -> Result<FakeSession, TransferError> {
            if let Behavior::RefuseConnection = self.behavior {
                return Err(TransferError::Connection {
                    message: "Connection refused (os error 111)".to_string(),
                });
            }
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            Ok(FakeSession {
                behavior: self.behavior,
                counters: Arc::clone(&self.counters),
            })
        }
    }

    impl SmtpSession for FakeSession {
        fn transfer(
            &mut self,
            _sender: &str,
            recipients: &[String],
            message: &[u8],
        ) -> Result<Vec<String>, TransferError> {
            assert!(!message.is_empty());
            match self.behavior {
                Behavior::Accept | Behavior::AcceptButQuitFails | Behavior::RefuseConnection => {
                    Ok(vec![])
                }
                Behavior::RefuseAll => Err(TransferError::RecipientsRefused {
                    recipients: recipients.join(", "),
                }),
                Behavior::DataReply(code) => Err(TransferError::Data {
                    code: Some(code),
                    message: format!("{code} reply during DATA"),
                }),
                Behavior::PanicDuringTransfer => panic!("injected fault during transfer"),
            }
        }

        fn quit(&mut self) -> Result<(), TransferError> {
            self.counters.quits.fetch_add(1, Ordering::SeqCst);
            if let Behavior::AcceptButQuitFails = self.behavior {
                self.counters.failed_quits.fetch_add(1, Ordering::SeqCst);
                return Err(TransferError::Connection {
                    message: "broken pipe".to_string(),
                });
            }
            Ok(())
        }

        fn close(&mut self) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fake_sender(behavior: Behavior) -> (SmtpSender<FakeConnector>, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let sender = SmtpSender::new(FakeConnector {
            behavior,
            counters: Arc::clone(&counters),
        });
        (sender, counters)
    }

    fn task() -> TaskDescriptor {
        TaskDescriptor::new(1, "test17000000001234@gmail.com")
    }

    #[tokio::test]
    async fn test_accepted_transfer_is_success() {
        let (sender, counters) = fake_sender(Behavior::Accept);
        let record = sender.send(&task()).await;

        assert!(record.is_success(), "{record:?}");
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminations(), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_data_reply_251_is_success() {
        let (sender, counters) = fake_sender(Behavior::DataReply(251));
        let record = sender.send(&task()).await;

        assert!(record.is_success(), "{record:?}");
        assert_eq!(counters.terminations(), 1);
    }

    #[tokio::test]
    async fn test_data_reply_250_is_success_but_554_is_not() {
        let (sender, _) = fake_sender(Behavior::DataReply(250));
        assert!(sender.send(&task()).await.is_success());

        let (sender, counters) = fake_sender(Behavior::DataReply(554));
        let record = sender.send(&task()).await;
        assert!(!record.is_success());
        assert!(record
            .error_detail
            .is_some_and(|d| d.starts_with("Data error: ")));
        assert_eq!(counters.terminations(), 1);
    }

    #[tokio::test]
    async fn test_refused_recipients_fail() {
        let (sender, counters) = fake_sender(Behavior::RefuseAll);
        let record = sender.send(&task()).await;

        assert!(!record.is_success());
        assert!(record
            .error_detail
            .is_some_and(|d| d.starts_with("Recipients refused: test17000000001234@gmail.com")));
        assert_eq!(counters.terminations(), 1);
    }

    #[tokio::test]
    async fn test_session_closed_once_when_transfer_panics() {
        let (sender, counters) = fake_sender(Behavior::PanicDuringTransfer);
        let record = sender.send(&task()).await;

        assert!(!record.is_success());
        assert!(record
            .error_detail
            .is_some_and(|d| d.starts_with("Unexpected error: ")));
        assert_eq!(counters.connects.load(Ordering::SeqCst), 1);
        assert_eq!(counters.quits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminations(), 1);
    }

    #[tokio::test]
    async fn test_failed_quit_falls_back_to_close() {
        let (sender, counters) = fake_sender(Behavior::AcceptButQuitFails);
        let record = sender.send(&task()).await;

        assert!(record.is_success());
        assert_eq!(counters.quits.load(Ordering::SeqCst), 1);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.terminations(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_opens_nothing() {
        let (sender, counters) = fake_sender(Behavior::RefuseConnection);
        let record = sender.send(&task()).await;

        assert!(!record.is_success());
        assert!(record
            .error_detail
            .is_some_and(|d| d.starts_with("Connection error: ")));
        assert_eq!(counters.terminations(), 0);
        assert!(sender.probe().await.is_err());
    }

    #[test]
    fn test_partial_refusal_is_a_failure() {
        let result = Ok(vec!["b@yahoo.com (550 no such user)".to_string()]);
        let detail = classify_transfer(&result).expect_err("partial refusal should fail");
        assert_eq!(detail, "Recipients refused: b@yahoo.com (550 no such user)");
    }

    #[test]
    fn test_data_error_without_code_fails() {
        let result = Err(TransferError::Data {
            code: None,
            message: "connection reset".to_string(),
        });
        assert!(classify_transfer(&result).is_err());
    }

    #[test]
    fn test_build_message_headers() {
        let message = build_message(&task()).expect("message should build");
        let text = String::from_utf8(message).expect("message should be utf-8");
        assert!(text
            .lines()
            .any(|l| l.starts_with("From: ") && l.contains("<perf-test@talk.stir.com>")));
        assert!(text.contains("To: test17000000001234@gmail.com"));
        assert!(text.contains("Subject: Performance Test #1 - "));
        assert!(text.contains("Content-Type: text/plain"));
    }
}
