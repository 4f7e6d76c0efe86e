//! ESMTP features

use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

use crate::authentication::Mechanism;
use crate::error::Error;
use crate::response::Response;

/// Default client id
const DEFAULT_DOMAIN_CLIENT_ID: &str = "localhost";

/// Client identifier, the domain sent with `EHLO`
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct ClientId(String);

impl Default for ClientId {
    fn default() -> Self {
        // Local hostname, or `localhost` when it is unset or not UTF-8.
        let name = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_DOMAIN_CLIENT_ID.to_string());
        ClientId(name)
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl ClientId {
    /// Creates a new `ClientId` from a fully qualified domain name
    pub fn new(domain: String) -> ClientId {
        ClientId(domain)
    }
}

/// Supported ESMTP keywords
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Extension {
    /// 8BITMIME keyword
    ///
    /// RFC 6152: https://tools.ietf.org/html/rfc6152
    EightBitMime,
    /// PIPELINING keyword
    ///
    /// RFC 2920: https://tools.ietf.org/html/rfc2920
    Pipelining,
    /// AUTH mechanism
    Authentication(Mechanism),
}

impl Display for Extension {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Extension::EightBitMime => f.write_str("8BITMIME"),
            Extension::Pipelining => f.write_str("PIPELINING"),
            Extension::Authentication(ref mechanism) => write!(f, "AUTH {}", mechanism),
        }
    }
}

/// Contains information about an SMTP server
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct ServerInfo {
    /// Server name
    ///
    /// The name given in the server banner
    pub name: String,
    /// ESMTP features supported by the server
    ///
    /// It contains the features supported by the server and known by the `Extension` module.
    pub features: HashSet<Extension>,
}

impl Display for ServerInfo {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{} with {}",
            self.name,
            if self.features.is_empty() {
                "no supported features".to_string()
            } else {
                format!("{:?}", self.features)
            }
        )
    }
}

impl ServerInfo {
    /// Parses an EHLO response to create a `ServerInfo`
    pub fn from_response(response: &Response) -> Result<ServerInfo, Error> {
        let name = match response.first_word() {
            Some(name) => name,
            None => return Err(Error::ResponseParsing("Could not read server name")),
        };

        let mut features: HashSet<Extension> = HashSet::new();

        for line in response.message.as_slice() {
            if line.is_empty() {
                continue;
            }

            let mut split = line.split_whitespace();
            match split.next() {
                Some("8BITMIME") => {
                    features.insert(Extension::EightBitMime);
                }
                Some("PIPELINING") => {
                    features.insert(Extension::Pipelining);
                }
                Some("AUTH") => {
                    for mechanism in split {
                        match mechanism {
                            "PLAIN" => {
                                features.insert(Extension::Authentication(Mechanism::Plain));
                            }
                            "LOGIN" => {
                                features.insert(Extension::Authentication(Mechanism::Login));
                            }
                            _ => (),
                        }
                    }
                }
                _ => (),
            };
        }

        Ok(ServerInfo {
            name: name.to_string(),
            features,
        })
    }

    /// Checks if the server supports an ESMTP feature
    pub fn supports_feature(&self, keyword: Extension) -> bool {
        self.features.contains(&keyword)
    }

    /// Checks if the server supports an ESMTP feature
    pub fn supports_auth_mechanism(&self, mechanism: Mechanism) -> bool {
        self.features
            .contains(&Extension::Authentication(mechanism))
    }
}

/// A `MAIL FROM` extension parameter
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum MailParameter {
    /// `BODY=8BITMIME`, RFC 6152
    EightBitMime,
}

impl Display for MailParameter {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            MailParameter::EightBitMime => f.write_str("BODY=8BITMIME"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clientid_fmt() {
        assert_eq!(
            format!("{}", ClientId::new("test".to_string())),
            "test".to_string()
        );
    }

    #[test]
    fn test_clientid_default_not_empty() {
        assert!(!ClientId::default().to_string().is_empty());
    }

    #[test]
    fn test_extension_fmt() {
        assert_eq!(
            format!("{}", Extension::EightBitMime),
            "8BITMIME".to_string()
        );
        assert_eq!(
            format!("{}", Extension::Authentication(Mechanism::Plain)),
            "AUTH PLAIN".to_string()
        );
    }

    #[test]
    fn test_serverinfo_gmail() {
        let response = "250-smtp.gmail.com at your service, [203.0.113.7]\r\n\
                        250-SIZE 35882577\r\n\
                        250-8BITMIME\r\n\
                        250-AUTH LOGIN PLAIN XOAUTH2 PLAIN-CLIENTTOKEN OAUTHBEARER XOAUTH\r\n\
                        250-ENHANCEDSTATUSCODES\r\n\
                        250-PIPELINING\r\n\
                        250-CHUNKING\r\n\
                        250 SMTPUTF8\r\n"
            .parse::<Response>()
            .unwrap();

        let server_info = ServerInfo::from_response(&response).unwrap();

        assert_eq!(server_info.name, "smtp.gmail.com");
        assert!(server_info.supports_feature(Extension::EightBitMime));
        assert!(server_info.supports_feature(Extension::Pipelining));
        assert!(server_info.supports_auth_mechanism(Mechanism::Plain));
        assert!(server_info.supports_auth_mechanism(Mechanism::Login));
        // SIZE, CHUNKING, SMTPUTF8 and the OAuth mechanisms are not used
        assert_eq!(server_info.features.len(), 4);
    }

    #[test]
    fn test_serverinfo_without_features() {
        let response = "250 me\r\n".parse::<Response>().unwrap();
        let server_info = ServerInfo::from_response(&response).unwrap();

        assert_eq!(server_info.name, "me");
        assert!(server_info.features.is_empty());
        assert_eq!(server_info.to_string(), "me with no supported features");
    }

    #[test]
    fn test_serverinfo_without_name() {
        let response = "250\r\n".parse::<Response>().unwrap();
        assert!(ServerInfo::from_response(&response).is_err());
    }
}
