//! Scripted in-memory transport, used to drive sessions without a network.

use std::collections::VecDeque;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use async_trait::async_trait;
use pin_project::pin_project;
use tokio::io::{AsyncRead as Read, AsyncWrite as Write, ReadBuf};

use crate::error::Error;
use crate::net::{Connector, ServerAddress};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Observes what a client did with a `MockStream`, even after the stream
/// itself has been moved into a transport.
#[derive(Clone, Debug, Default)]
pub struct MockHandle {
    written: Arc<Mutex<Vec<u8>>>,
    shutdowns: Arc<AtomicUsize>,
}

impl MockHandle {
    /// Everything the client wrote so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.written).clone()
    }

    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(&self.written()).into_owned()
    }

    /// Number of times the client shut the stream down
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Number of DATA commands the client issued
    pub fn data_commands(&self) -> usize {
        self.written_string().matches("\r\nDATA\r\n").count()
    }
}

/// A stream replaying canned server replies and recording client output.
#[pin_project]
#[derive(Debug)]
pub struct MockStream {
    #[pin]
    reader: Cursor<Vec<u8>>,
    handle: MockHandle,
}

impl Default for MockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream::with_vec(Vec::new())
    }

    pub fn with_vec(vec: Vec<u8>) -> MockStream {
        MockStream {
            reader: Cursor::new(vec),
            handle: MockHandle::default(),
        }
    }

    /// Creates a stream that answers with the given replies, in order
    pub fn with_replies(replies: &[&str]) -> MockStream {
        MockStream::with_vec(replies.concat().into_bytes())
    }

    pub fn handle(&self) -> MockHandle {
        self.handle.clone()
    }
}

impl Read for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().reader.poll_read(cx, buf)
    }
}

impl Write for MockStream {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context, buf: &[u8]) -> Poll<io::Result<usize>> {
        lock(&self.handle.written).extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context) -> Poll<io::Result<()>> {
        self.handle.shutdowns.fetch_add(1, Ordering::SeqCst);
        Poll::Ready(Ok(()))
    }
}

/// A `Connector` handing out prepared `MockStream`s, one per connection.
///
/// Once the prepared streams run out, or when built with `failing`, every
/// connection attempt fails.
#[derive(Debug)]
pub struct MockConnector {
    streams: Mutex<VecDeque<MockStream>>,
    failure: Option<io::ErrorKind>,
    attempts: AtomicUsize,
}

impl MockConnector {
    pub fn new(streams: Vec<MockStream>) -> MockConnector {
        MockConnector {
            streams: Mutex::new(streams.into()),
            failure: None,
            attempts: AtomicUsize::new(0),
        }
    }

    /// A connector whose connections always fail with the given kind
    pub fn failing(kind: io::ErrorKind) -> MockConnector {
        MockConnector {
            streams: Mutex::new(VecDeque::new()),
            failure: Some(kind),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of connection attempts so far
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Stream = MockStream;

    async fn connect(&self, server: &ServerAddress) -> Result<MockStream, Error> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.failure {
            return Err(io::Error::new(kind, format!("cannot connect to {}", server)).into());
        }
        let next = lock(&self.streams).pop_front();
        next.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionRefused, "no more mock streams").into()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::async_test;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async_test! { write_is_recorded_test, {
        let mut mock = MockStream::new();
        let handle = mock.handle();
        mock.write_all(&[1, 2, 3]).await.unwrap();
        assert_eq!(handle.written(), vec![1, 2, 3]);
    }}

    async_test! { replies_are_read_in_order_test, {
        let mut mock = MockStream::with_replies(&["220 ready\r\n", "250 ok\r\n"]);
        let mut replies = String::new();
        mock.read_to_string(&mut replies).await.unwrap();
        assert_eq!(replies, "220 ready\r\n250 ok\r\n");
    }}

    async_test! { shutdown_is_counted_test, {
        let mut mock = MockStream::new();
        let handle = mock.handle();
        mock.shutdown().await.unwrap();
        assert_eq!(handle.shutdowns(), 1);
    }}

    async_test! { connector_hands_out_streams_in_order_test, {
        let connector = MockConnector::new(vec![MockStream::with_replies(&["220 ready\r\n"])]);
        let server = ServerAddress::default();

        assert!(connector.connect(&server).await.is_ok());
        assert!(connector.connect(&server).await.is_err());
        assert_eq!(connector.attempts(), 2);
    }}

    async_test! { failing_connector_test, {
        let connector = MockConnector::failing(io::ErrorKind::TimedOut);
        match connector.connect(&ServerAddress::default()).await {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }}
}
