//! Smtps-mailer composes a plaintext email and submits it over an SMTP session
//! wrapped in implicit TLS.
//!
//! The [`MailSender`] performs one complete attempt: connect, authenticate,
//! submit, close. The lower layers ([`SmtpTransport`], [`SmtpStream`]) work
//! over any async stream, which is how the [`mock`] transport drives them in
//! tests.

#![deny(
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    missing_debug_implementations,
    clippy::unwrap_used
)]

pub mod authentication;
mod codec;
pub mod commands;
pub mod error;
pub mod extension;
pub mod message;
pub mod mock;
pub mod net;
pub mod response;
pub mod sender;
mod smtp_client;
mod stream;
mod types;

pub use crate::codec::ClientCodec;
pub use crate::message::{EmailMessage, Mailbox};
pub use crate::net::{ClientTlsParameters, Connector, ImplicitTls, ServerAddress};
pub use crate::sender::{report, MailSender, SendError, SUCCESS_NOTICE};
pub use crate::smtp_client::{SmtpClient, SmtpTransport, SUBMISSIONS_PORT};
pub use crate::stream::SmtpStream;
pub use types::*;

#[doc(hidden)]
#[macro_export]
macro_rules! async_test {
    ($name:ident, $block:block) => {
        #[tokio::test]
        async fn $name() {
            $block
        }
    };
}
