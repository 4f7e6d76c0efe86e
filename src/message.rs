//! Plaintext message composition
//!
//! Produces a minimal single-part MIME document: a `text/plain` body and the
//! `Subject`, `From` and `To` headers. Bodies that are pure ASCII go out as
//! `7bit`, anything else as base64-encoded UTF-8.

use std::fmt::{self, Display, Formatter};

use crate::error::MessageError;
use crate::{EmailAddress, Envelope, SendableEmail};

/// Maximum encoded line length for base64 bodies (RFC 2045)
const BASE64_LINE_LENGTH: usize = 76;
/// Raw bytes per RFC 2047 encoded word, keeping each word under 75 chars
const ENCODED_WORD_CHUNK: usize = 45;
/// RFC 5322 specials that force a display name into a quoted string
const SPECIALS: &[char] = &['(', ')', '<', '>', '[', ']', ':', ';', '@', '\\', ',', '.', '"'];

fn has_line_break(value: &str) -> bool {
    value.contains(|c: char| c == '\r' || c == '\n')
}

/// A sender mailbox: an address with an optional display name.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Mailbox {
    name: Option<String>,
    address: EmailAddress,
}

impl Mailbox {
    pub fn new(name: Option<String>, address: EmailAddress) -> Result<Mailbox, MessageError> {
        if name.as_deref().map_or(false, has_line_break) {
            return Err(MessageError::HeaderInjection);
        }
        Ok(Mailbox {
            name: name.filter(|name| !name.trim().is_empty()),
            address,
        })
    }

    pub fn address(&self) -> &EmailAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl From<EmailAddress> for Mailbox {
    fn from(address: EmailAddress) -> Self {
        Mailbox {
            name: None,
            address,
        }
    }
}

/// Header form: `Name <address>` or the bare address
impl Display for Mailbox {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.name {
            None => write!(f, "{}", self.address),
            Some(name) if !name.is_ascii() => {
                write!(f, "{} <{}>", encode_words(name), self.address)
            }
            Some(name) if name.contains(SPECIALS) => {
                let quoted = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{}\" <{}>", quoted, self.address)
            }
            Some(name) => write!(f, "{} <{}>", name, self.address),
        }
    }
}

/// One plaintext email, to a single recipient.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct EmailMessage {
    sender: Mailbox,
    recipient: EmailAddress,
    subject: String,
    body: String,
}

impl EmailMessage {
    /// Creates a message, refusing empty fields and line breaks in the subject.
    pub fn new<S: Into<String>, B: Into<String>>(
        sender: Mailbox,
        recipient: EmailAddress,
        subject: S,
        body: B,
    ) -> Result<EmailMessage, MessageError> {
        let subject = subject.into();
        let body = body.into();

        if subject.is_empty() {
            return Err(MessageError::EmptySubject);
        }
        if has_line_break(&subject) {
            return Err(MessageError::HeaderInjection);
        }
        if body.is_empty() {
            return Err(MessageError::EmptyBody);
        }

        Ok(EmailMessage {
            sender,
            recipient,
            subject,
            body,
        })
    }

    /// Convenience constructor from raw strings
    pub fn from_parts(
        sender_name: Option<&str>,
        sender_address: &str,
        recipient_address: &str,
        subject: &str,
        body: &str,
    ) -> Result<EmailMessage, MessageError> {
        let sender = Mailbox::new(
            sender_name.map(str::to_string),
            sender_address.parse::<EmailAddress>()?,
        )?;
        EmailMessage::new(sender, recipient_address.parse()?, subject, body)
    }

    pub fn sender(&self) -> &Mailbox {
        &self.sender
    }

    pub fn recipient(&self) -> &EmailAddress {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// SMTP envelope: reverse path is the sender, forward path the recipient
    pub fn envelope(&self) -> Envelope {
        Envelope::new(self.sender.address.clone(), self.recipient.clone())
    }

    /// The message in transport form, with CRLF line endings
    pub fn formatted(&self) -> Vec<u8> {
        let ascii_body = self.body.is_ascii();
        let (charset, transfer_encoding) = if ascii_body {
            ("us-ascii", "7bit")
        } else {
            ("utf-8", "base64")
        };

        let mut out = String::with_capacity(self.body.len() + 256);
        push_header(
            &mut out,
            "Content-Type",
            &format!("text/plain; charset=\"{}\"", charset),
        );
        push_header(&mut out, "MIME-Version", "1.0");
        push_header(&mut out, "Content-Transfer-Encoding", transfer_encoding);
        push_header(&mut out, "Subject", &encode_header_value(&self.subject));
        push_header(&mut out, "From", &self.sender.to_string());
        push_header(&mut out, "To", self.recipient.as_ref());
        out.push_str("\r\n");

        if ascii_body {
            out.push_str(&self.body);
        } else {
            out.push_str(&encode_body(&self.body));
        }
        out.into_bytes()
    }

    /// Serializes the message together with its envelope
    pub fn to_sendable(&self) -> SendableEmail {
        SendableEmail::new(self.envelope(), self.formatted())
    }
}

fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        encode_words(value)
    }
}

/// RFC 2047 `B` encoding, split on character boundaries into folded words
fn encode_words(value: &str) -> String {
    let mut words = Vec::new();
    let mut start = 0;
    let mut end = 0;
    for (idx, c) in value.char_indices() {
        let next = idx + c.len_utf8();
        if next - start > ENCODED_WORD_CHUNK {
            words.push(&value[start..end]);
            start = end;
        }
        end = next;
    }
    words.push(&value[start..end]);

    words
        .into_iter()
        .map(|word| format!("=?utf-8?b?{}?=", base64::encode(word)))
        .collect::<Vec<_>>()
        .join("\r\n ")
}

fn encode_body(body: &str) -> String {
    let encoded = base64::encode(body);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2 + 2);
    for line in encoded.as_bytes().chunks(BASE64_LINE_LENGTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push_str("\r\n");
    }
    out
}
