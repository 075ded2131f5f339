use async_trait::async_trait;
use lettre::transport::smtp::{
    authentication::{Credentials, Mechanism},
    client::{AsyncSmtpConnection, TlsParameters},
    commands::{Data, Mail, Rcpt},
    extension::ClientId,
};
use lettre::Address;
use tracing::debug;

use super::{Connector, DataCloseError, SessionError, SmtpSession};

/// Opens plaintext SMTP connections with lettre; TLS is negotiated later
/// through STARTTLS.
#[derive(Debug, Clone, Default)]
pub struct LettreConnector {
    hello_name: ClientId,
}

impl LettreConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for LettreConnector {
    type Session = LettreSession;

    async fn connect(&self, host: &str, port: u16) -> Result<LettreSession, SessionError> {
        debug!(host, port, "connecting to smtp server");
        let connection =
            AsyncSmtpConnection::connect_tokio1((host, port), None, &self.hello_name, None, None)
                .await?;

        Ok(LettreSession {
            connection,
            hello_name: self.hello_name.clone(),
            pending: Vec::new(),
            broken: false,
        })
    }
}

/// A live lettre connection. The socket closes when this is dropped.
pub struct LettreSession {
    connection: AsyncSmtpConnection,
    hello_name: ClientId,
    pending: Vec<u8>,
    // Set after a failed STARTTLS: lettre may have already detached the
    // plaintext stream, so nothing else may be written to the connection.
    broken: bool,
}

#[async_trait]
impl SmtpSession for LettreSession {
    async fn starttls(&mut self, host: &str) -> Result<(), SessionError> {
        // Certificate chains are not verified; the host is still sent as SNI.
        let parameters = TlsParameters::builder(host.to_string())
            .dangerous_accept_invalid_certs(true)
            .build()?;
        if let Err(err) = self.connection.starttls(parameters, &self.hello_name).await {
            self.broken = true;
            return Err(err.into());
        }
        Ok(())
    }

    async fn auth(&mut self, username: &str, password: &str) -> Result<(), SessionError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.connection
            .auth(&[Mechanism::Plain], &credentials)
            .await?;
        Ok(())
    }

    async fn mail_from(&mut self, sender: &str) -> Result<(), SessionError> {
        let address: Address = sender.parse()?;
        self.connection
            .command(Mail::new(Some(address), Vec::new()))
            .await?;
        Ok(())
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<(), SessionError> {
        let address: Address = recipient.parse()?;
        self.connection
            .command(Rcpt::new(address, Vec::new()))
            .await?;
        Ok(())
    }

    async fn open_data(&mut self) -> Result<(), SessionError> {
        self.connection.command(Data).await?;
        self.pending.clear();
        Ok(())
    }

    // lettre writes and terminates the payload in one call, so the bytes are
    // held until `close_data`.
    async fn write_data(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.pending.extend_from_slice(bytes);
        Ok(())
    }

    async fn close_data(&mut self) -> Result<(), DataCloseError> {
        let payload = std::mem::take(&mut self.pending);
        match self.connection.message(&payload).await {
            Ok(_) => Ok(()),
            // Only a reply code means the server saw the whole payload.
            Err(err) if err.is_permanent() || err.is_transient() => {
                Err(DataCloseError::Rejected(err.into()))
            }
            Err(err) => Err(DataCloseError::Write(err.into())),
        }
    }

    async fn quit(&mut self) -> Result<(), SessionError> {
        if self.broken {
            debug!("skipping quit on a connection left unusable by starttls");
            return Ok(());
        }
        if self.connection.has_broken() {
            self.connection.abort().await;
            return Ok(());
        }
        self.connection.quit().await?;
        Ok(())
    }
}
