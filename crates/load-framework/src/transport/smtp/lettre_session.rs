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

use std::time::Duration;

use lettre::{
    transport::smtp::{
        client::SmtpConnection,
        commands::{Data, Mail, Rcpt},
        extension::ClientId,
        Error as SmtpError,
    },
    Address,
};

use super::{SessionConnector, SmtpSession, TransferError};

/// Connects to a plaintext SMTP listener, e.g. a port-forwarded MTA.
pub struct LettreConnector {
    host: String,
    port: u16,
    hello_name: ClientId,
}

impl LettreConnector {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            hello_name: ClientId::Domain("localhost".to_string()),
        }
    }
}

impl SessionConnector for LettreConnector {
    type Session = LettreSession;

    fn connect(&self, timeout: Duration) -> Result<LettreSession, TransferError> {
        let connection = SmtpConnection::connect(
            (self.host.as_str(), self.port),
            Some(timeout),
            &self.hello_name,
            None,
            None,
        )
        .map_err(|e| session_error(&e))?;

        Ok(LettreSession { connection })
    }
}

pub struct LettreSession {
    connection: SmtpConnection,
}

fn reply_code(e: &SmtpError) -> Option<u16> {
    e.status().and_then(|code| code.to_string().parse().ok())
}

/// A reply from the server is a protocol fault, anything else is the connection failing.
fn session_error(e: &SmtpError) -> TransferError {
    if e.status().is_some() || e.is_response() {
        TransferError::Protocol {
            message: e.to_string(),
        }
    } else {
        TransferError::Connection {
            message: e.to_string(),
        }
    }
}

fn data_error(e: &SmtpError) -> TransferError {
    if e.status().is_none() && !e.is_response() {
        return session_error(e);
    }
    TransferError::Data {
        code: reply_code(e),
        message: e.to_string(),
    }
}

fn parse_address(address: &str) -> Result<Address, TransferError> {
    address.parse().map_err(|e| TransferError::Unexpected {
        message: format!("invalid address {address}: {e}"),
    })
}

impl SmtpSession for LettreSession {
    fn transfer(
        &mut self,
        sender: &str,
        recipients: &[String],
        message: &[u8],
    ) -> Result<Vec<String>, TransferError> {
        let sender = parse_address(sender)?;
        self.connection
            .command(Mail::new(Some(sender), vec![]))
            .map_err(|e| session_error(&e))?;

        let mut refused = Vec::new();
        for recipient in recipients {
            let address = parse_address(recipient)?;
            if let Err(e) = self.connection.command(Rcpt::new(address, vec![])) {
                if e.status().is_none() {
                    return Err(session_error(&e));
                }
                refused.push(format!("{recipient} ({e})"));
            }
        }
        if !refused.is_empty() && refused.len() == recipients.len() {
            return Err(TransferError::RecipientsRefused {
                recipients: refused.join(", "),
            });
        }

        self.connection
            .command(Data)
            .map_err(|e| data_error(&e))?;
        self.connection
            .message(message)
            .map_err(|e| data_error(&e))?;

        Ok(refused)
    }

    fn quit(&mut self) -> Result<(), TransferError> {
        self.connection
            .quit()
            .map(|_| ())
            .map_err(|e| session_error(&e))
    }

    fn close(&mut self) {
        self.connection.abort();
    }
}
