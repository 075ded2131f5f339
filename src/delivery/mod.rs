//! Drives one SMTP session from connect to quit, stopping at the first
//! failed step and reporting which step it was.

mod lettre_session;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::message::OutboundMessage;

pub use lettre_session::{LettreConnector, LettreSession};

pub type SessionError = Box<dyn std::error::Error + Send + Sync>;

/// The SMTP step a delivery failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Connect,
    StartTls,
    Auth,
    MailFrom,
    RcptTo,
    DataOpen,
    DataWrite,
    DataClose,
}

impl Stage {
    /// Short message safe to return to HTTP callers.
    pub fn description(&self) -> &'static str {
        match self {
            Stage::Connect => "Failed to connect to mail server",
            Stage::StartTls => "Failed to start TLS",
            Stage::Auth => "Failed to authenticate",
            Stage::MailFrom => "Failed to set sender",
            Stage::RcptTo => "Failed to set recipient",
            Stage::DataOpen => "Failed to get data writer",
            Stage::DataWrite => "Failed to write message",
            Stage::DataClose => "Failed to close data writer",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::StartTls => "starttls",
            Stage::Auth => "auth",
            Stage::MailFrom => "mail-from",
            Stage::RcptTo => "rcpt-to",
            Stage::DataOpen => "data-open",
            Stage::DataWrite => "data-write",
            Stage::DataClose => "data-close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("smtp {stage} failed: {source}")]
pub struct DeliveryError {
    pub stage: Stage,
    #[source]
    pub source: SessionError,
}

impl DeliveryError {
    fn at(stage: Stage) -> impl FnOnce(SessionError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Failure at the end of the data stream, split by whether the payload
/// reached the server.
#[derive(Debug)]
pub enum DataCloseError {
    /// The payload could not be sent in full.
    Write(SessionError),
    /// The server answered the terminating dot with an error reply.
    Rejected(SessionError),
}

impl DataCloseError {
    fn into_delivery_error(self) -> DeliveryError {
        match self {
            DataCloseError::Write(source) => DeliveryError {
                stage: Stage::DataWrite,
                source,
            },
            DataCloseError::Rejected(source) => DeliveryError {
                stage: Stage::DataClose,
                source,
            },
        }
    }
}

/// Opens SMTP sessions. The production implementation is [`LettreConnector`].
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: SmtpSession;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Session, SessionError>;
}

/// One step per SMTP command. Dropping the session releases the connection.
#[async_trait]
pub trait SmtpSession: Send {
    /// Upgrades to TLS, presenting `host` as the expected server name.
    async fn starttls(&mut self, host: &str) -> Result<(), SessionError>;
    async fn auth(&mut self, username: &str, password: &str) -> Result<(), SessionError>;
    async fn mail_from(&mut self, sender: &str) -> Result<(), SessionError>;
    async fn rcpt_to(&mut self, recipient: &str) -> Result<(), SessionError>;
    async fn open_data(&mut self) -> Result<(), SessionError>;
    async fn write_data(&mut self, bytes: &[u8]) -> Result<(), SessionError>;
    /// Ends the data stream; the server accepts or rejects the message here.
    async fn close_data(&mut self) -> Result<(), DataCloseError>;
    async fn quit(&mut self) -> Result<(), SessionError>;
}

/// Sends `message` through a fresh session. `QUIT` is attempted on every
/// path once connected, and the session is dropped before returning.
pub async fn deliver<C: Connector>(
    connector: &C,
    config: &Config,
    message: &OutboundMessage,
) -> Result<(), DeliveryError> {
    let mut session = connector
        .connect(&config.smtp_host, config.smtp_port)
        .await
        .map_err(DeliveryError::at(Stage::Connect))?;

    let result = run_transaction(&mut session, config, message).await;

    if let Err(err) = session.quit().await {
        debug!(error = %err, "smtp quit failed");
    }
    drop(session);

    if result.is_ok() {
        info!(recipients = message.recipients.len(), "notification delivered");
    }
    result
}

async fn run_transaction<S: SmtpSession>(
    session: &mut S,
    config: &Config,
    message: &OutboundMessage,
) -> Result<(), DeliveryError> {
    session
        .starttls(&config.smtp_host)
        .await
        .map_err(DeliveryError::at(Stage::StartTls))?;

    session
        .auth(&message.sender, &config.email_password)
        .await
        .map_err(DeliveryError::at(Stage::Auth))?;

    session
        .mail_from(&message.sender)
        .await
        .map_err(DeliveryError::at(Stage::MailFrom))?;

    for recipient in &message.recipients {
        session.rcpt_to(recipient).await.map_err(|source| {
            debug!(%recipient, "recipient rejected");
            DeliveryError {
                stage: Stage::RcptTo,
                source,
            }
        })?;
    }

    session
        .open_data()
        .await
        .map_err(DeliveryError::at(Stage::DataOpen))?;

    session
        .write_data(&message.to_bytes())
        .await
        .map_err(DeliveryError::at(Stage::DataWrite))?;

    session
        .close_data()
        .await
        .map_err(DataCloseError::into_delivery_error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_and_descriptions() {
        assert_eq!(Stage::MailFrom.to_string(), "mail-from");
        assert_eq!(Stage::StartTls.to_string(), "starttls");
        assert_eq!(Stage::Connect.description(), "Failed to connect to mail server");
        assert_eq!(Stage::DataClose.description(), "Failed to close data writer");
    }

    #[test]
    fn error_display_carries_stage_and_cause() {
        let err = DeliveryError {
            stage: Stage::Auth,
            source: "535 bad credentials".into(),
        };
        assert_eq!(err.to_string(), "smtp auth failed: 535 bad credentials");
    }

    #[test]
    fn data_close_errors_map_to_their_stage() {
        let write = DataCloseError::Write("connection reset".into()).into_delivery_error();
        assert_eq!(write.stage, Stage::DataWrite);

        let rejected = DataCloseError::Rejected("554 spam".into()).into_delivery_error();
        assert_eq!(rejected.stage, Stage::DataClose);
        assert_eq!(rejected.source.to_string(), "554 spam");
    }
}
