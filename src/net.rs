//! Opening connections to the submission server

use std::fmt;

use async_native_tls::{TlsConnector, TlsStream};
use async_trait::async_trait;
use log::debug;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write};
use tokio::net::{lookup_host, TcpStream};

use crate::error::Error;
use crate::smtp_client::SUBMISSIONS_PORT;

/// Default submission host
pub const DEFAULT_HOST: &str = "smtp.gmail.com";

/// Host and port of the submission server
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    pub fn new(host: String, port: u16) -> ServerAddress {
        ServerAddress { host, port }
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        ServerAddress::new(DEFAULT_HOST.to_string(), SUBMISSIONS_PORT)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// TLS settings for one connection
pub struct ClientTlsParameters {
    pub connector: TlsConnector,
    /// Name sent as SNI and checked against the server certificate
    pub domain: String,
}

impl fmt::Debug for ClientTlsParameters {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("ClientTlsParameters")
            .field("connector", &"TlsConnector")
            .field("domain", &self.domain)
            .finish()
    }
}

impl ClientTlsParameters {
    pub fn new(domain: String, connector: TlsConnector) -> ClientTlsParameters {
        ClientTlsParameters { connector, domain }
    }
}

/// Opens the byte stream an SMTP session runs over
#[async_trait]
pub trait Connector: Send + Sync {
    /// The stream a successful connection yields
    type Stream: Read + Write + Unpin + Send;

    /// Opens a connection to the given server
    async fn connect(&self, server: &ServerAddress) -> Result<Self::Stream, Error>;
}

/// Connects over TCP and negotiates TLS before any SMTP exchange (SMTPS).
#[derive(Debug, Clone, Default)]
pub struct ImplicitTls {
    /// TLS domain override; the server host is used when unset
    domain: Option<String>,
}

impl ImplicitTls {
    pub fn new() -> ImplicitTls {
        ImplicitTls::default()
    }

    /// Validate the server certificate against this name instead of the host
    pub fn domain(mut self, domain: String) -> ImplicitTls {
        self.domain = Some(domain);
        self
    }

    fn tls_parameters(&self, server: &ServerAddress) -> ClientTlsParameters {
        let connector = TlsConnector::new();
        let domain = self
            .domain
            .clone()
            .unwrap_or_else(|| server.host.clone());
        ClientTlsParameters::new(domain, connector)
    }
}

#[async_trait]
impl Connector for ImplicitTls {
    type Stream = TlsStream<TcpStream>;

    async fn connect(&self, server: &ServerAddress) -> Result<Self::Stream, Error> {
        let server_addr = lookup_host((server.host.as_str(), server.port))
            .await?
            .next()
            .ok_or(Error::Resolution)?;

        debug!("connecting to {} ({})", server, server_addr);
        let tcp_stream = TcpStream::connect(server_addr).await?;

        let tls_parameters = self.tls_parameters(server);
        let tls_stream = tls_parameters
            .connector
            .connect(&tls_parameters.domain, tcp_stream)
            .await?;
        debug!("connection encrypted");

        Ok(tls_stream)
    }
}
