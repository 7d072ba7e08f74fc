use crate::config::TcpOutputConfig;
use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::PluginWriter;
use crate::protocol::{self, Message, PAYLOAD_SEPARATOR};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

const WORKER_QUEUE: usize = 100;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Ships framed origin traffic to a TCP aggregator.
///
/// Each worker owns one keep-alive connection and its own queue. Sticky mode
/// hashes the correlation ID so every message of a captured flow rides the
/// same connection, preserving request/response pairing downstream.
pub struct TcpOutput {
    address: String,
    config: TcpOutputConfig,
    queues: Vec<mpsc::Sender<Message>>,
    worker_index: AtomicUsize,
    quit: watch::Sender<bool>,
}

impl TcpOutput {
    /// Starts the worker connections.
    pub fn new(address: &str, config: TcpOutputConfig) -> Result<Arc<Self>, RecastError> {
        if config.workers == 0 {
            return Err(RecastError::new(
                RecastErrorKind::Constructor,
                "tcp output needs at least one worker",
            ));
        }
        let (quit, _) = watch::channel(false);
        let mut queues = Vec::with_capacity(config.workers);
        for _ in 0..config.workers {
            let (tx, rx) = mpsc::channel(WORKER_QUEUE);
            queues.push(tx);
            tokio::spawn(worker(address.to_string(), rx, quit.subscribe()));
        }
        Ok(Arc::new(TcpOutput {
            address: address.to_string(),
            config,
            queues,
            worker_index: AtomicUsize::new(0),
            quit,
        }))
    }

    /// The aggregator address this output ships to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Stops all workers.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }

    fn queue_index(&self, msg: &Message) -> usize {
        if !self.config.sticky {
            return self.worker_index.fetch_add(1, Ordering::Relaxed) % self.queues.len();
        }
        protocol::fnv32a(msg.id()) as usize % self.queues.len()
    }
}

async fn worker(address: String, mut rx: mpsc::Receiver<Message>, mut quit: watch::Receiver<bool>) {
    let mut pending: Option<Message> = None;
    let mut retried = false;
    'reconnect: loop {
        let mut retries: u32 = 0;
        let mut conn = loop {
            if *quit.borrow() {
                return;
            }
            match TcpStream::connect(&address).await {
                Ok(conn) => break conn,
                Err(e) => {
                    tracing::debug!(
                        address = %address,
                        retries,
                        error = %e,
                        "cannot reach aggregator, reconnecting in 1s"
                    );
                    retries += 1;
                    tokio::select! {
                        _ = quit.changed() => return,
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                    }
                }
            }
        };
        if retries > 0 {
            tracing::debug!(address = %address, retries, "aggregator connection restored");
        }

        loop {
            let msg = match pending.take() {
                Some(msg) => msg,
                None => {
                    retried = false;
                    tokio::select! {
                        _ = quit.changed() => return,
                        msg = rx.recv() => match msg {
                            Some(msg) => msg,
                            None => return,
                        },
                    }
                }
            };
            if let Err(e) = write_frame(&mut conn, &msg).await {
                tracing::debug!(error = %e, "tcp output connection closed, reconnecting");
                // the in-flight message gets one more attempt, never two
                if !retried {
                    pending = Some(msg);
                    retried = true;
                }
                continue 'reconnect;
            }
        }
    }
}

async fn write_frame(conn: &mut TcpStream, msg: &Message) -> std::io::Result<()> {
    conn.write_all(&msg.meta).await?;
    conn.write_all(&msg.data).await?;
    conn.write_all(PAYLOAD_SEPARATOR).await?;
    Ok(())
}

#[async_trait]
impl PluginWriter for TcpOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        if !protocol::is_origin_payload(&msg.meta) {
            return Ok(msg.data.len());
        }
        let index = self.queue_index(msg);
        self.queues[index]
            .send(msg.clone())
            .await
            .map_err(|_| RecastError::new(RecastErrorKind::Transport, "tcp output closed"))?;
        Ok(msg.len())
    }
}
