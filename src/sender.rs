//! One-shot delivery of a single message over implicit TLS.
//!
//! [`MailSender::send`] runs one complete attempt: connect, EHLO,
//! authenticate, submit, close. Failures are tagged with the phase that
//! produced them. There is no retry; [`SendError::is_transient`] lets a
//! caller decide whether trying again later makes sense.

use std::future::Future;
use std::io::{self, Write};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::authentication::{Credentials, Mechanism, DEFAULT_MECHANISMS};
use crate::error::Error;
use crate::extension::ClientId;
use crate::message::EmailMessage;
use crate::net::{Connector, ImplicitTls, ServerAddress};
use crate::response::Response;
use crate::smtp_client::{SmtpClient, SmtpTransport};
use crate::SendableEmail;

/// Line printed when the message was accepted
pub const SUCCESS_NOTICE: &str = "Email Sent Successfully";

/// Default network timeout for each phase of the session
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for the QUIT exchange while closing
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a send attempt failed, by phase
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    /// Connecting, TLS negotiation, greeting or EHLO failed
    #[error("connection failed: {0}")]
    Connection(#[source] Error),
    /// The server rejected the credentials, or offers no usable mechanism
    #[error("authentication failed: {0}")]
    Auth(#[source] Error),
    /// MAIL, RCPT, DATA or the message itself was refused
    #[error("submission failed: {0}")]
    Submission(#[source] Error),
}

impl SendError {
    /// The underlying protocol error
    pub fn error(&self) -> &Error {
        match self {
            SendError::Connection(err) | SendError::Auth(err) | SendError::Submission(err) => err,
        }
    }

    /// Whether the same attempt could succeed later
    pub fn is_transient(&self) -> bool {
        self.error().is_transient()
    }
}

/// Writes the one-line outcome of a send attempt.
pub fn report<W: Write>(outcome: &Result<Response, SendError>, out: &mut W) -> io::Result<()> {
    match outcome {
        Ok(_) => writeln!(out, "{}", SUCCESS_NOTICE),
        Err(err) => writeln!(out, "Error : {}", err),
    }
}

/// Runs `future` under an optional deadline.
async fn within<F, T>(timeout: Option<Duration>, future: F) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    match timeout {
        Some(duration) => tokio::time::timeout(duration, future).await?,
        None => future.await,
    }
}

/// Sends single messages to one submission server with one set of credentials.
#[derive(Debug)]
pub struct MailSender<C: Connector = ImplicitTls> {
    connector: C,
    server: ServerAddress,
    credentials: Credentials,
    client: SmtpClient,
    mechanisms: Vec<Mechanism>,
    timeout: Option<Duration>,
}

impl MailSender<ImplicitTls> {
    /// A sender for `smtp.gmail.com:465` over implicit TLS.
    ///
    /// Defaults are:
    ///
    /// * PLAIN, then LOGIN authentication
    /// * A 60 seconds timeout per phase
    pub fn new(credentials: Credentials) -> Self {
        MailSender::with_connector(ImplicitTls::new(), credentials)
    }
}

impl<C: Connector> MailSender<C> {
    /// A sender opening its connections through `connector`
    pub fn with_connector(connector: C, credentials: Credentials) -> Self {
        MailSender {
            connector,
            server: ServerAddress::default(),
            credentials,
            client: SmtpClient::new(),
            mechanisms: DEFAULT_MECHANISMS.to_vec(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Set the submission server
    pub fn server(self, server: ServerAddress) -> Self {
        Self { server, ..self }
    }

    /// Set the name used during EHLO
    pub fn hello_name(self, name: ClientId) -> Self {
        Self {
            client: self.client.hello_name(name),
            ..self
        }
    }

    /// Set the SMTP client configuration
    pub fn client(self, client: SmtpClient) -> Self {
        Self { client, ..self }
    }

    /// Set the accepted authentication mechanisms, in order of preference
    pub fn authentication_mechanisms(self, mechanisms: Vec<Mechanism>) -> Self {
        Self { mechanisms, ..self }
    }

    /// Set the timeout of each phase, `None` to wait forever
    pub fn timeout(self, timeout: Option<Duration>) -> Self {
        Self { timeout, ..self }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn server_address(&self) -> &ServerAddress {
        &self.server
    }

    /// Delivers `message` in one attempt.
    ///
    /// Once connected, the connection is closed before returning, whatever
    /// the outcome. Calling this twice sends the message twice.
    pub async fn send(&self, message: &EmailMessage) -> Result<Response, SendError> {
        let email = message.to_sendable();
        debug!(
            "from=<{}> to=<{}> via {}",
            email.envelope().from(),
            email.envelope().to(),
            self.server
        );

        let stream = within(self.timeout, self.connector.connect(&self.server))
            .await
            .map_err(SendError::Connection)?;
        let mut transport = SmtpTransport::from_stream(self.client.clone(), stream);

        let result = self.session(&mut transport, &email).await;
        close(&mut transport).await;

        match &result {
            Ok(response) => info!(
                "to=<{}>, status=sent ({})",
                email.envelope().to(),
                response.first_line().unwrap_or("no response")
            ),
            Err(err) => info!("to=<{}>, status=failed ({})", email.envelope().to(), err),
        }
        result
    }

    /// Delivers `message` and writes the one-line outcome to `out`.
    ///
    /// Returns whether the message was accepted.
    pub async fn send_and_report<W: Write>(
        &self,
        message: &EmailMessage,
        out: &mut W,
    ) -> io::Result<bool> {
        let outcome = self.send(message).await;
        report(&outcome, out)?;
        Ok(outcome.is_ok())
    }

    async fn session<S>(
        &self,
        transport: &mut SmtpTransport<S>,
        email: &SendableEmail,
    ) -> Result<Response, SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        within(self.timeout, transport.handshake())
            .await
            .map_err(SendError::Connection)?;
        within(
            self.timeout,
            transport.try_login(&self.credentials, &self.mechanisms),
        )
        .await
        .map_err(SendError::Auth)?;
        within(self.timeout, transport.send(email))
            .await
            .map_err(SendError::Submission)
    }
}

/// Says goodbye and releases the connection; failures are only logged.
async fn close<S>(transport: &mut SmtpTransport<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(err) = within(Some(CLOSE_TIMEOUT), transport.quit()).await {
        warn!("QUIT failed: {}", err);
    }
    if let Err(err) = transport.shutdown().await {
        warn!("could not shut the connection down: {}", err);
    }
    debug!("connection closed");
}
