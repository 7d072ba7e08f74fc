use crate::error::RecastError;
use crate::plugin::PluginReader;
use crate::protocol::{self, Message, PayloadType};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

const DUMMY_REQUEST: &[u8] =
    b"GET / HTTP/1.1\r\nHost: www.example.com\r\nUser-Agent: recast\r\nAccept-Encoding: gzip\r\n\r\n";
const DUMMY_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n";

/// Debug input emitting one correlated GET request/response pair per second.
pub struct DummyInput {
    rx: Mutex<mpsc::Receiver<Message>>,
    quit: watch::Sender<bool>,
}

impl DummyInput {
    /// Starts the ticker task and returns the input.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::channel(4);
        let (quit, mut quit_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = quit_rx.changed() => return,
                    _ = ticker.tick() => {
                        let id = protocol::uuid();
                        let request = Message::new(
                            protocol::payload_header(
                                PayloadType::Request,
                                &id,
                                protocol::now_nanos(),
                                -1,
                            ),
                            Bytes::from_static(DUMMY_REQUEST),
                        );
                        let response = Message::new(
                            protocol::payload_header(
                                PayloadType::Response,
                                &id,
                                protocol::now_nanos() + 1,
                                1,
                            ),
                            Bytes::from_static(DUMMY_RESPONSE),
                        );
                        if tx.send(request).await.is_err() || tx.send(response).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Arc::new(DummyInput {
            rx: Mutex::new(rx),
            quit,
        })
    }

    /// Stops the ticker; pending reads return `Stopped`.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }
}

#[async_trait]
impl PluginReader for DummyInput {
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
