//! SMTP session: greeting, EHLO, authentication and one mail transaction

use log::{debug, info};
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};

use crate::authentication::{Credentials, Mechanism};
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::{ClientId, Extension, MailParameter, ServerInfo};
use crate::stream::SmtpStream;
use crate::SendableEmail;

/// Submission over implicit TLS (RFC 8314)
pub const SUBMISSIONS_PORT: u16 = 465;

/// Upper bound on 334 rounds during AUTH
const MAX_CHALLENGES: usize = 10;

/// Session options, independent of any connection.
///
/// Defaults are:
///
/// * Local hostname as EHLO name
/// * Pipelining when the server offers it
/// * A greeting is read before EHLO
#[derive(Debug, Clone)]
pub struct SmtpClient {
    hello_name: ClientId,
    pipelining: bool,
    /// Some test servers start silently
    read_greeting: bool,
}

impl Default for SmtpClient {
    fn default() -> Self {
        SmtpClient {
            hello_name: ClientId::default(),
            pipelining: true,
            read_greeting: true,
        }
    }
}

impl SmtpClient {
    pub fn new() -> Self {
        SmtpClient::default()
    }

    /// Pipeline MAIL, RCPT and DATA when the server offers it
    pub fn pipelining(mut self, enabled: bool) -> SmtpClient {
        self.pipelining = enabled;
        self
    }

    pub fn hello_name(mut self, name: ClientId) -> SmtpClient {
        self.hello_name = name;
        self
    }

    /// Send EHLO right away instead of waiting for a greeting
    pub fn without_greeting(mut self) -> SmtpClient {
        self.read_greeting = false;
        self
    }
}

/// One SMTP session over an established connection.
#[derive(Debug)]
pub struct SmtpTransport<S: Read + Write + Unpin> {
    options: SmtpClient,
    /// What the server announced after EHLO, empty before the handshake
    server_info: ServerInfo,
    stream: SmtpStream<S>,
}

impl<S: Read + Write + Unpin> SmtpTransport<S> {
    /// Wraps an established connection without exchanging anything yet.
    ///
    /// `handshake` must succeed before the session can be used.
    pub fn from_stream(options: SmtpClient, stream: S) -> Self {
        SmtpTransport {
            options,
            server_info: ServerInfo::default(),
            stream: SmtpStream::new(stream),
        }
    }

    /// Wraps the connection and performs the handshake.
    pub async fn new(options: SmtpClient, stream: S) -> Result<Self, Error> {
        let mut transport = SmtpTransport::from_stream(options, stream);
        transport.handshake().await?;
        Ok(transport)
    }

    /// Reads the greeting, sends EHLO and records the server capabilities.
    pub async fn handshake(&mut self) -> SmtpResult {
        if self.options.read_greeting {
            let greeting = self.stream.read_response().await?;
            debug!("greeted by {}", greeting.first_word().unwrap_or("unknown server"));
        }

        let response = self.stream.ehlo(self.options.hello_name.clone()).await?;
        self.server_info = ServerInfo::from_response(&response)?;
        debug!("server {}", self.server_info);
        Ok(response)
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    fn offers(&self, extension: Extension) -> bool {
        self.server_info.supports_feature(extension)
    }

    /// Authenticates with the first of `accepted_mechanisms` the server offers.
    pub async fn try_login(
        &mut self,
        credentials: &Credentials,
        accepted_mechanisms: &[Mechanism],
    ) -> SmtpResult {
        let server_info = &self.server_info;
        let mechanism = accepted_mechanisms
            .iter()
            .copied()
            .find(|mechanism| server_info.supports_auth_mechanism(*mechanism))
            .ok_or(Error::NoSupportedMechanism)?;

        let response = self.auth(mechanism, credentials).await?;
        info!("authenticated as {} using {}", credentials.username(), mechanism);
        Ok(response)
    }

    /// Runs AUTH with `mechanism`, answering up to `MAX_CHALLENGES` server challenges.
    pub async fn auth(&mut self, mechanism: Mechanism, credentials: &Credentials) -> SmtpResult {
        let initial = AuthCommand::new(mechanism, credentials.clone(), None)?;
        let mut response = self.stream.auth_command(initial).await?;

        for _ in 0..MAX_CHALLENGES {
            if !response.has_code(334) {
                return Ok(response);
            }
            let answer = AuthCommand::new_from_response(mechanism, credentials.clone(), &response)?;
            response = self.stream.auth_command(answer).await?;
        }

        Err(Error::ResponseParsing("Unexpected number of challenges"))
    }

    fn mail_parameters(&self) -> Vec<MailParameter> {
        if self.offers(Extension::EightBitMime) {
            vec![MailParameter::EightBitMime]
        } else {
            Vec::new()
        }
    }

    /// Runs one mail transaction: MAIL, RCPT, DATA, then the message itself.
    pub async fn send(&mut self, email: &SendableEmail) -> SmtpResult {
        let envelope = email.envelope();
        let mail = MailCommand::new(envelope.from().clone(), self.mail_parameters());
        let rcpt = RcptCommand::new(envelope.to().clone());

        if self.options.pipelining && self.offers(Extension::Pipelining) {
            self.stream.send_command(mail).await?;
            self.stream.send_command(rcpt).await?;
            self.stream.send_command(DataCommand).await?;
            // Replies come back in command order; the first negative one aborts.
            for _ in 0..3 {
                self.stream.read_response().await?;
            }
        } else {
            self.stream.command(mail).await?;
            self.stream.command(rcpt).await?;
            self.stream.command(DataCommand).await?;
        }

        let response = self.stream.message(email.message()).await?;
        debug!(
            "to=<{}> accepted ({})",
            envelope.to(),
            response.first_line().unwrap_or("no response")
        );
        Ok(response)
    }

    /// Ends the session politely.
    pub async fn quit(&mut self) -> SmtpResult {
        self.stream.command(QuitCommand).await
    }

    /// Releases the underlying connection.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::async_test;
    use crate::authentication::DEFAULT_MECHANISMS;
    use crate::mock::MockStream;
    use crate::Envelope;

    const GREETING: &str = "220 mx.example.org ESMTP ready\r\n";
    const EHLO: &str = "250-mx.example.org\r\n250-8BITMIME\r\n250 AUTH LOGIN PLAIN\r\n";

    fn client() -> SmtpClient {
        SmtpClient::new().hello_name(ClientId::new("client.example.org".to_string()))
    }

    fn email() -> SendableEmail {
        SendableEmail::new(
            Envelope::new(
                "user@example.org".parse().unwrap(),
                "root@example.org".parse().unwrap(),
            ),
            "Subject: hi\r\n\r\nHello example\r\n",
        )
    }

    async_test! { test_handshake, {
        let mock = MockStream::with_replies(&[GREETING, EHLO]);
        let handle = mock.handle();

        let transport = SmtpTransport::new(client(), mock).await.unwrap();

        assert_eq!(handle.written_string(), "EHLO client.example.org\r\n");
        assert_eq!(transport.server_info().name, "mx.example.org");
    }}

    async_test! { test_login_prefers_plain, {
        let mock = MockStream::with_replies(&[GREETING, EHLO, "235 2.7.0 Accepted\r\n"]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        transport.try_login(&credentials, DEFAULT_MECHANISMS).await.unwrap();

        assert!(handle
            .written_string()
            .ends_with("AUTH PLAIN AHVzZXIAcGFzc3dvcmQ=\r\n"));
    }}

    async_test! { test_login_with_challenges, {
        let mock = MockStream::with_replies(&[
            GREETING,
            "250-mx.example.org\r\n250 AUTH LOGIN\r\n",
            "334 VXNlcm5hbWU6\r\n",
            "334 UGFzc3dvcmQ6\r\n",
            "235 2.7.0 Accepted\r\n",
        ]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        let response = transport
            .try_login(&credentials, DEFAULT_MECHANISMS)
            .await
            .unwrap();

        assert!(response.has_code(235));
        assert!(handle
            .written_string()
            .ends_with("AUTH LOGIN\r\ndXNlcg==\r\ncGFzc3dvcmQ=\r\n"));
    }}

    async_test! { test_login_without_common_mechanism, {
        let mock = MockStream::with_replies(&[GREETING, "250 mx.example.org\r\n"]);
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        let credentials = Credentials::new("user".to_string(), "password".to_string());
        assert!(matches!(
            transport.try_login(&credentials, DEFAULT_MECHANISMS).await,
            Err(Error::NoSupportedMechanism)
        ));
    }}

    async_test! { test_send, {
        let mock = MockStream::with_replies(&[
            GREETING,
            EHLO,
            "250 2.1.0 OK\r\n",
            "250 2.1.5 OK\r\n",
            "354 Go ahead\r\n",
            "250 2.0.0 OK queued\r\n",
        ]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        let response = transport.send(&email()).await.unwrap();

        assert_eq!(response.first_line(), Some("2.0.0 OK queued"));
        assert_eq!(
            handle.written_string(),
            "EHLO client.example.org\r\n\
             MAIL FROM:<user@example.org> BODY=8BITMIME\r\n\
             RCPT TO:<root@example.org>\r\n\
             DATA\r\n\
             Subject: hi\r\n\r\nHello example\r\n.\r\n"
        );
    }}

    async_test! { test_send_pipelined, {
        let mock = MockStream::with_replies(&[
            GREETING,
            "250-mx.example.org\r\n250 PIPELINING\r\n",
            "250 2.1.0 OK\r\n250 2.1.5 OK\r\n354 Go ahead\r\n",
            "250 2.0.0 OK queued\r\n",
        ]);
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        assert!(transport.send(&email()).await.is_ok());
    }}

    async_test! { test_send_rejected_recipient, {
        let mock = MockStream::with_replies(&[
            GREETING,
            EHLO,
            "250 2.1.0 OK\r\n",
            "550 5.1.1 The email account that you tried to reach does not exist\r\n",
        ]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        assert!(matches!(
            transport.send(&email()).await,
            Err(Error::Permanent(_))
        ));
        assert_eq!(handle.data_commands(), 0);
    }}

    async_test! { test_handshake_without_greeting, {
        let mock = MockStream::with_replies(&["250 mx.example.org\r\n"]);
        let handle = mock.handle();

        let transport = SmtpTransport::new(client().without_greeting(), mock)
            .await
            .unwrap();

        assert_eq!(handle.written_string(), "EHLO client.example.org\r\n");
        assert_eq!(transport.server_info().name, "mx.example.org");
    }}

    async_test! { test_send_without_pipelining, {
        let mock = MockStream::with_replies(&[
            GREETING,
            "250-mx.example.org\r\n250 PIPELINING\r\n",
            "250 2.1.0 OK\r\n",
            "550 5.1.1 No such user\r\n",
        ]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client().pipelining(false), mock)
            .await
            .unwrap();

        assert!(matches!(
            transport.send(&email()).await,
            Err(Error::Permanent(_))
        ));
        // Lock-step: DATA is never written after the RCPT rejection
        assert!(handle.written_string().ends_with("RCPT TO:<root@example.org>\r\n"));
        assert_eq!(handle.data_commands(), 0);
    }}

    async_test! { test_send_pipelined_rejected_recipient, {
        let mock = MockStream::with_replies(&[
            GREETING,
            "250-mx.example.org\r\n250 PIPELINING\r\n",
            "250 2.1.0 OK\r\n550 5.1.1 No such user\r\n554 5.5.1 No valid recipients\r\n",
        ]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        match transport.send(&email()).await {
            Err(Error::Permanent(response)) => assert!(response.has_code(550)),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(handle.data_commands(), 1);
        assert!(!handle.written_string().contains("Subject: hi"));
    }}

    async_test! { test_quit_and_shutdown, {
        let mock = MockStream::with_replies(&[GREETING, EHLO, "221 2.0.0 closing connection\r\n"]);
        let handle = mock.handle();
        let mut transport = SmtpTransport::new(client(), mock).await.unwrap();

        transport.quit().await.unwrap();
        transport.shutdown().await.unwrap();

        assert!(handle.written_string().ends_with("QUIT\r\n"));
        assert_eq!(handle.shutdowns(), 1);
    }}
}
