use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::PluginReader;
use crate::protocol::{self, Message};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, Mutex};

/// Accepts aggregator connections and re-emits their separator-framed
/// messages; the receiving side of [`crate::output::TcpOutput`].
pub struct TcpInput {
    address: SocketAddr,
    rx: Mutex<mpsc::Receiver<Message>>,
    quit: watch::Sender<bool>,
}

impl TcpInput {
    /// Binds the listener and starts accepting feeds.
    pub async fn new(address: &str) -> Result<Arc<Self>, RecastError> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            RecastError::new(
                RecastErrorKind::Constructor,
                format!("tcp input bind {}: {}", address, e),
            )
        })?;
        let address = listener.local_addr().map_err(|e| {
            RecastError::new(RecastErrorKind::Constructor, e.to_string())
        })?;

        let (tx, rx) = mpsc::channel(1000);
        let (quit, quit_rx) = watch::channel(false);
        let accept_quit = quit_rx.clone();
        tokio::spawn(async move {
            let mut accept_quit = accept_quit;
            loop {
                tokio::select! {
                    _ = accept_quit.changed() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            tracing::debug!(%peer, "tcp input connection accepted");
                            let tx = tx.clone();
                            let quit_rx = quit_rx.clone();
                            tokio::spawn(read_feed(stream, tx, quit_rx));
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "tcp input accept failed");
                        }
                    },
                }
            }
        });

        Ok(Arc::new(TcpInput {
            address,
            rx: Mutex::new(rx),
            quit,
        }))
    }

    /// The address the listener actually bound (useful with port `0`).
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting and reading.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }
}

async fn read_feed(
    mut stream: TcpStream,
    tx: mpsc::Sender<Message>,
    mut quit: watch::Receiver<bool>,
) {
    let mut buf: Vec<u8> = Vec::with_capacity(64 * 1024);
    let mut chunk = [0u8; 16 * 1024];
    loop {
        let n = tokio::select! {
            _ = quit.changed() => return,
            read = stream.read(&mut chunk) => match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "tcp input connection lost");
                    break;
                }
            },
        };
        buf.extend_from_slice(&chunk[..n]);
        while let Some(pos) = protocol::find_separator(&buf) {
            let frame = Bytes::copy_from_slice(&buf[..pos]);
            buf.drain(..pos + protocol::PAYLOAD_SEPARATOR.len());
            if frame.is_empty() {
                continue;
            }
            let (meta, data) = protocol::split_meta_and_body(&frame);
            if meta.is_empty() {
                tracing::debug!("resynchronizing: frame without meta line");
                continue;
            }
            if tx.send(Message::new(meta, data)).await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl PluginReader for TcpInput {
    async fn plugin_read(&self) -> Result<Message, RecastError> {
        if *self.quit.borrow() {
            return Err(RecastError::stopped());
        }
        let mut quit = self.quit.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = quit.changed() => Err(RecastError::stopped()),
            msg = rx.recv() => msg.ok_or_else(RecastError::stopped),
        }
    }
}
