//! Error and result types

use std::io;
use std::string::FromUtf8Error;

use base64::DecodeError;

use crate::response::{Response, Severity};

use self::Error::*;

/// Errors raised while building addresses
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressError {
    /// Empty address
    #[error("missing email address")]
    Empty,
    /// Address would break the SMTP envelope
    #[error("invalid email address")]
    InvalidEmailAddress,
}

/// Errors raised while composing a message
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    #[error("{0}")]
    Address(#[from] AddressError),
    #[error("missing subject")]
    EmptySubject,
    #[error("missing body")]
    EmptyBody,
    /// A header value carries a line break
    #[error("header values may not contain CR or LF characters")]
    HeaderInjection,
}

/// An enum of all SMTP error kinds.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transient SMTP error, 4xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("transient: {}", .0.first_line().unwrap_or("undetailed error during SMTP transaction"))]
    Transient(Response),
    /// Permanent SMTP error, 5xx reply code
    ///
    /// [RFC 5321, section 4.2.1](https://tools.ietf.org/html/rfc5321#section-4.2.1)
    #[error("permanent: {}", .0.first_line().unwrap_or("undetailed error during SMTP transaction"))]
    Permanent(Response),
    /// Error parsing a response
    #[error("{0}")]
    ResponseParsing(&'static str),
    /// Error parsing a base64 string in response
    #[error("challenge parsing: {0}")]
    ChallengeParsing(#[from] DecodeError),
    /// Error parsing UTF8 in response
    #[error("utf8: {0}")]
    Utf8Parsing(#[from] FromUtf8Error),
    /// Internal client error
    #[error("client: {0}")]
    Client(&'static str),
    /// DNS resolution error
    #[error("could not resolve hostname")]
    Resolution,
    /// IO error
    #[error("io: {0}")]
    Io(#[from] io::Error),
    /// TLS error
    #[error("tls: {0}")]
    Tls(#[from] async_native_tls::Error),
    /// Parsing error
    #[error("parsing: {0:?}")]
    Parsing(nom::error::ErrorKind),
    /// A network phase took longer than its deadline
    #[error("timeout: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),
    /// The server offers none of the mechanisms we accept
    #[error("no supported authentication mechanism available")]
    NoSupportedMechanism,
}

impl Error {
    /// Returns true for failures worth retrying later: 4xx replies,
    /// network errors and timeouts.
    pub fn is_transient(&self) -> bool {
        matches!(self, Transient(_) | Io(_) | Timeout(_) | Resolution)
    }
}

impl From<Response> for Error {
    fn from(response: Response) -> Error {
        match response.code.severity {
            Severity::TransientNegativeCompletion => Transient(response),
            Severity::PermanentNegativeCompletion => Permanent(response),
            _ => Client("Unknown error code"),
        }
    }
}

impl From<&'static str> for Error {
    fn from(string: &'static str) -> Error {
        Client(string)
    }
}

/// SMTP result type
pub type SmtpResult = Result<Response, Error>;
