//! Line-level SMTP conversation over a buffered async stream

use std::fmt::Display;
use std::io;

use log::debug;
use tokio::io::{
    AsyncBufReadExt, AsyncRead as Read, AsyncWrite as Write, AsyncWriteExt, BufReader,
};

use crate::codec::ClientCodec;
use crate::commands::*;
use crate::error::{Error, SmtpResult};
use crate::extension::ClientId;
use crate::response::{parse_response, Response};

/// Longest reply accepted, all lines together
const MAX_REPLY_LENGTH: usize = 16 * 1024;

/// Shows CR and LF in wire traces
fn visible_crlf(line: &str) -> String {
    line.replace("\r\n", "<CRLF>")
}

/// Maps a complete reply to the session result: 2xx and 3xx pass, 4xx and 5xx fail
fn into_result(response: Response) -> SmtpResult {
    if response.is_positive() {
        Ok(response)
    } else {
        Err(response.into())
    }
}

/// An established connection to the server, spoken to one line at a time.
#[derive(Debug)]
pub struct SmtpStream<S: Read + Write + Unpin> {
    conn: BufReader<S>,
}

impl<S: Read + Write + Unpin> SmtpStream<S> {
    pub fn new(stream: S) -> Self {
        SmtpStream {
            conn: BufReader::new(stream),
        }
    }

    pub async fn ehlo(&mut self, client_id: ClientId) -> SmtpResult {
        self.command(EhloCommand::new(client_id)).await
    }

    /// Writes `command` and waits for its reply.
    pub async fn command(&mut self, command: impl Display) -> SmtpResult {
        self.send_command(command).await?;
        self.read_response().await
    }

    /// Like `command`, with the credentials masked in the trace.
    pub async fn auth_command(&mut self, command: AuthCommand) -> SmtpResult {
        let line = command.to_string();
        self.write_line(&line, &command.masked()).await?;
        self.read_response().await
    }

    /// Writes `command` without reading anything back, for pipelining.
    pub async fn send_command(&mut self, command: impl Display) -> Result<(), Error> {
        let line = command.to_string();
        self.write_line(&line, &visible_crlf(&line)).await
    }

    async fn write_line(&mut self, line: &str, trace: &str) -> Result<(), Error> {
        let conn = self.conn.get_mut();
        conn.write_all(line.as_bytes()).await?;
        conn.flush().await?;
        debug!(">> {}", trace);
        Ok(())
    }

    /// Reads one complete, possibly multiline, reply.
    ///
    /// Negative replies come back as `Error::Transient` or `Error::Permanent`.
    pub async fn read_response(&mut self) -> SmtpResult {
        let mut received = String::with_capacity(128);

        while self.conn.read_line(&mut received).await? > 0 {
            debug!("<< {}", visible_crlf(&received));
            if received.len() > MAX_REPLY_LENGTH {
                return Err(Error::ResponseParsing("reply too long"));
            }
            match parse_response(&received) {
                Ok((_, response)) => return into_result(response),
                Err(nom::Err::Incomplete(_)) => continue,
                Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => {
                    return Err(Error::Parsing(err.code))
                }
            }
        }

        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-reply").into())
    }

    /// Sends the message body after DATA was accepted, then reads the final reply.
    pub(crate) async fn message(&mut self, message: &[u8]) -> SmtpResult {
        let conn = self.conn.get_mut();
        let mut codec = ClientCodec::new();
        codec.encode(message, &mut *conn).await?;
        codec.encode(&[], &mut *conn).await?;
        conn.flush().await?;
        debug!(">> <{} bytes of message data>", message.len());

        self.read_response().await
    }

    /// Shuts the write half of the connection down.
    pub async fn shutdown(&mut self) -> Result<(), Error> {
        self.conn.get_mut().shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::async_test;
    use crate::mock::MockStream;

    #[test]
    fn test_visible_crlf() {
        assert_eq!(visible_crlf("QUIT\r\n"), "QUIT<CRLF>");
        assert_eq!(
            visible_crlf("250-a\r\n250 b\r\n"),
            "250-a<CRLF>250 b<CRLF>"
        );
    }

    async_test! { test_read_multiline_response, {
        let mock = MockStream::with_replies(&["250-first\r\n250-second\r\n250 last\r\n"]);
        let mut stream = SmtpStream::new(mock);

        let response = stream.read_response().await.unwrap();
        assert!(response.has_code(250));
        assert_eq!(response.message, vec!["first", "second", "last"]);
    }}

    async_test! { test_consecutive_replies, {
        let mock = MockStream::with_replies(&["250 2.1.0 OK\r\n354 Go ahead\r\n"]);
        let mut stream = SmtpStream::new(mock);

        assert!(stream.read_response().await.unwrap().has_code(250));
        assert!(stream.read_response().await.unwrap().has_code(354));
    }}

    async_test! { test_negative_response_is_error, {
        let mock = MockStream::with_replies(&["550 5.1.1 No such user\r\n"]);
        let mut stream = SmtpStream::new(mock);

        match stream.read_response().await {
            Err(Error::Permanent(response)) => assert!(response.has_code(550)),
            other => panic!("unexpected result: {:?}", other),
        }
    }}

    async_test! { test_truncated_response_is_error, {
        let mock = MockStream::with_replies(&["250-first\r\n"]);
        let mut stream = SmtpStream::new(mock);

        assert!(matches!(stream.read_response().await, Err(Error::Io(_))));
    }}

    async_test! { test_oversized_reply_is_error, {
        let line = format!("250-{}\r\n", "x".repeat(200));
        let mock = MockStream::with_vec(line.repeat(100).into_bytes());
        let mut stream = SmtpStream::new(mock);

        assert!(matches!(
            stream.read_response().await,
            Err(Error::ResponseParsing("reply too long"))
        ));
    }}

    async_test! { test_command_writes_line, {
        let mock = MockStream::with_replies(&["221 2.0.0 Bye\r\n"]);
        let handle = mock.handle();
        let mut stream = SmtpStream::new(mock);

        stream.command(QuitCommand).await.unwrap();
        assert_eq!(handle.written_string(), "QUIT\r\n");
    }}

    async_test! { test_message_is_stuffed_and_terminated, {
        let mock = MockStream::with_replies(&["250 2.0.0 OK\r\n"]);
        let handle = mock.handle();
        let mut stream = SmtpStream::new(mock);

        stream.message(b"Subject: x\n\n.dot\n").await.unwrap();
        assert_eq!(handle.written_string(), "Subject: x\r\n\r\n..dot\r\n.\r\n");
    }}
}
