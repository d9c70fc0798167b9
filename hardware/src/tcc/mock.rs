//! In-memory transport for exercising a [`TccLink`](super::TccLink) without a TCC.
//!
//! [`MockTransport::new`] returns the transport together with a
//! [`MockHandle`] that plays the TCC side: it pushes reply lines, records what
//! was written, and injects connection failures.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::transport::{LineReceiver, LineTransport};

#[derive(Default)]
struct MockInner {
    connected: bool,
    refuse_connections: bool,
    failing_writes: usize,
    written: Vec<String>,
    inbound: Option<mpsc::UnboundedSender<String>>,
    auto_replies: Vec<(String, Vec<String>)>,
    connect_attempts: usize,
}

fn lock(inner: &Mutex<MockInner>) -> MutexGuard<'_, MockInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport half handed to the link.
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

/// Test-side controller for a [`MockTransport`].
#[derive(Clone)]
pub struct MockHandle {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    pub fn new() -> (Self, MockHandle) {
        let inner = Arc::new(Mutex::new(MockInner::default()));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            MockHandle { inner },
        )
    }
}

#[async_trait]
impl LineTransport for MockTransport {
    fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }

    async fn connect(&mut self) -> io::Result<LineReceiver> {
        let mut inner = lock(&self.inner);
        inner.connect_attempts += 1;
        if inner.refuse_connections {
            inner.connected = false;
            inner.inbound = None;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock refused connection",
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.inbound = Some(tx);
        inner.connected = true;
        Ok(rx)
    }

    async fn disconnect(&mut self) {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.inbound = None;
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut inner = lock(&self.inner);
        if !inner.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "not connected"));
        }
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            inner.connected = false;
            inner.inbound = None;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        inner.written.push(line.to_string());

        let replies: Vec<String> = inner
            .auto_replies
            .iter()
            .filter(|(trigger, _)| line.contains(trigger.as_str()))
            .flat_map(|(_, lines)| lines.iter().cloned())
            .collect();
        if let Some(tx) = &inner.inbound {
            for reply in replies {
                let _ = tx.send(reply);
            }
        }
        Ok(())
    }
}

impl MockHandle {
    /// Lines written by the link, in order.
    pub fn written_lines(&self) -> Vec<String> {
        lock(&self.inner).written.clone()
    }

    pub fn bytes_written(&self) -> usize {
        lock(&self.inner).written.iter().map(|l| l.len() + 1).sum()
    }

    pub fn connect_attempts(&self) -> usize {
        lock(&self.inner).connect_attempts
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.inner).connected
    }

    /// Deliver a line as if the TCC had sent it. Returns false when no
    /// connection is open.
    pub fn push_line(&self, line: &str) -> bool {
        match &lock(&self.inner).inbound {
            Some(tx) => tx.send(line.to_string()).is_ok(),
            None => false,
        }
    }

    /// Reply with `lines` whenever a written line contains `trigger`.
    pub fn reply_to(&self, trigger: &str, lines: &[&str]) {
        lock(&self.inner).auto_replies.push((
            trigger.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        ));
    }

    pub fn refuse_connections(&self, refuse: bool) {
        lock(&self.inner).refuse_connections = refuse;
    }

    /// Make the next `count` writes fail and drop the connection.
    pub fn fail_next_writes(&self, count: usize) {
        lock(&self.inner).failing_writes = count;
    }

    /// Close the connection from the TCC side.
    pub fn drop_connection(&self) {
        let mut inner = lock(&self.inner);
        inner.connected = false;
        inner.inbound = None;
    }
}
