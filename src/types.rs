//! Envelope-level types: addresses and the serialized message

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::error::AddressError;

/// Characters that would let an address escape `MAIL FROM:<...>` or a header
fn breaks_envelope(c: char) -> bool {
    !c.is_ascii() || c.is_ascii_control() || c.is_ascii_whitespace() || c == '<' || c == '>'
}

/// A mailbox address as used on the SMTP envelope.
///
/// Only checked for what would corrupt the protocol; the server decides
/// whether the address is deliverable.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(address: String) -> Result<EmailAddress, AddressError> {
        if address.is_empty() {
            Err(AddressError::Empty)
        } else if address.contains(breaks_envelope) {
            Err(AddressError::InvalidEmailAddress)
        } else {
            Ok(EmailAddress(address))
        }
    }
}

impl FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(address: &str) -> Result<Self, Self::Err> {
        EmailAddress::new(address.to_owned())
    }
}

impl Display for EmailAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// SMTP envelope of a single-recipient submission
///
/// Only mailboxes are accepted, no source routes (as per RFC).
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Envelope {
    /// The envelope sender address
    reverse_path: EmailAddress,
    /// The envelope recipient address
    forward_path: EmailAddress,
}

impl Envelope {
    pub fn new(from: EmailAddress, to: EmailAddress) -> Envelope {
        Envelope {
            reverse_path: from,
            forward_path: to,
        }
    }

    /// Source address of the envelope
    pub fn from(&self) -> &EmailAddress {
        &self.reverse_path
    }

    /// Destination address of the envelope
    pub fn to(&self) -> &EmailAddress {
        &self.forward_path
    }
}

/// A serialized message ready for the DATA phase, with its envelope
#[derive(Clone, Debug)]
pub struct SendableEmail {
    envelope: Envelope,
    message: Vec<u8>,
}

impl SendableEmail {
    pub fn new<T: Into<Vec<u8>>>(envelope: Envelope, message: T) -> SendableEmail {
        SendableEmail {
            envelope,
            message: message.into(),
        }
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn message(&self) -> &[u8] {
        &self.message
    }
}
