//! Line transports for the TCC link.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Stream of incoming lines. Closes when the connection drops.
pub type LineReceiver = mpsc::UnboundedReceiver<String>;

/// A bidirectional, newline-delimited text connection.
///
/// Implementations deliver each received line, without its terminator, on the
/// receiver returned from [`connect`](LineTransport::connect).
#[async_trait]
pub trait LineTransport: Send + 'static {
    fn is_connected(&self) -> bool;

    /// Open the connection, replacing any existing one.
    async fn connect(&mut self) -> io::Result<LineReceiver>;

    async fn disconnect(&mut self);

    /// Write one line. The terminator is added here.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;
}

/// TCP transport to a TCC host.
pub struct TcpLineTransport {
    address: String,
    connect_timeout: Duration,
    writer: Option<OwnedWriteHalf>,
    reader_task: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
}

impl TcpLineTransport {
    pub fn new(address: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            writer: None,
            reader_task: None,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn close(&mut self) {
        self.connected.store(false, Ordering::SeqCst);
        self.writer = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl LineTransport for TcpLineTransport {
    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&mut self) -> io::Result<LineReceiver> {
        self.close();

        info!("Connecting to TCC at {}", self.address);
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {} timed out", self.address),
                )
            })??;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let address = self.address.clone();

        let reader_task = tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        trace!("TCC recv: {:?}", line);
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("TCC at {} closed the connection", address);
                        break;
                    }
                    Err(e) => {
                        warn!("TCC read error from {}: {}", address, e);
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
        });

        self.writer = Some(write_half);
        self.reader_task = Some(reader_task);
        self.connected = connected;
        Ok(rx)
    }

    async fn disconnect(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("TCC shutdown error: {}", e);
            }
        }
        self.close();
    }

    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "not connected"))?;

        debug!("TCC send: {:?}", line);
        let mut msg = line.to_string();
        if !msg.ends_with('\n') {
            msg.push('\n');
        }

        let result = async {
            writer.write_all(msg.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if result.is_err() {
            self.close();
        }
        result
    }
}

impl Drop for TcpLineTransport {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            write_half.write_all(b"0 7 yourUserID=7\n").await.unwrap();
            let mut lines = BufReader::new(read_half).lines();
            lines.next_line().await.unwrap()
        });

        let mut transport = TcpLineTransport::new(address, Duration::from_secs(1));
        assert!(!transport.is_connected());

        let mut rx = transport.connect().await.unwrap();
        assert!(transport.is_connected());
        assert_eq!(rx.recv().await.unwrap(), "0 7 yourUserID=7");

        transport.write_line("999 device status").await.unwrap();
        assert_eq!(
            server.await.unwrap(),
            Some("999 device status".to_string())
        );

        // Server side is gone, so the reader ends.
        assert!(rx.recv().await.is_none());
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let mut transport = TcpLineTransport::new(address, Duration::from_secs(1));
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
        assert!(transport.write_line("999 device status").await.is_err());
    }
}
