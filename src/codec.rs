use tokio::io::{AsyncWrite as Write, AsyncWriteExt};

use std::io;

/// DATA transparency encoder
///
/// Applies RFC 5321 dot-stuffing and rewrites bare CR and bare LF as CRLF.
/// State is carried across frames, so a message can be fed in pieces; an
/// empty frame terminates the message with `CRLF.CRLF`.
#[derive(Clone, Copy, Debug)]
pub struct ClientCodec {
    line_start: bool,
    pending_cr: bool,
}

impl Default for ClientCodec {
    fn default() -> Self {
        ClientCodec {
            line_start: true,
            pending_cr: false,
        }
    }
}

impl ClientCodec {
    pub fn new() -> Self {
        ClientCodec::default()
    }

    /// Writes `frame` with transparency applied, or the terminator when `frame` is empty
    pub async fn encode<W: Write + Unpin>(&mut self, frame: &[u8], mut buf: W) -> io::Result<()> {
        let out = if frame.is_empty() {
            self.finish()
        } else {
            self.stuff(frame)
        };
        buf.write_all(&out).await
    }

    fn stuff(&mut self, frame: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(frame.len() + 8);
        for &byte in frame {
            if byte == b'\n' {
                out.extend_from_slice(b"\r\n");
                self.pending_cr = false;
                self.line_start = true;
                continue;
            }
            if self.pending_cr {
                // bare CR
                out.extend_from_slice(b"\r\n");
                self.pending_cr = false;
                self.line_start = true;
            }
            if byte == b'\r' {
                self.pending_cr = true;
                continue;
            }
            if self.line_start && byte == b'.' {
                out.push(b'.');
            }
            self.line_start = false;
            out.push(byte);
        }
        out
    }

    fn finish(&mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        if self.pending_cr || !self.line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
        *self = ClientCodec::new();
        out
    }
}
