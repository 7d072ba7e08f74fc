use crate::error::RecastError;
use crate::plugin::PluginReader;
use crate::protocol::{self, Message, PayloadType};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

const GET_PAYLOAD: &[u8] =
    b"GET / HTTP/1.1\r\nHost: www.example.com\r\nUser-Agent: recast\r\nAccept-Encoding: gzip\r\n\r\n";
const POST_PAYLOAD: &[u8] =
    b"POST / HTTP/1.1\r\nHost: www.example.com\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: 7\r\n\r\na=1&b=2";
const OPTIONS_PAYLOAD: &[u8] = b"OPTIONS / HTTP/1.1\r\nHost: www.example.com\r\n\r\n";

/// Scriptable input used by the test suite to inject traffic.
///
/// By default every emitted payload gets a fresh meta line; with
/// `set_skip_header(true)` the emitted bytes are treated as complete
/// `meta ‖ body` frames instead.
pub struct TestInput {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    skip_header: AtomicBool,
    quit: watch::Sender<bool>,
}

impl TestInput {
    /// Creates an idle test input.
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (quit, _) = watch::channel(false);
        Arc::new(TestInput {
            tx,
            rx: Mutex::new(rx),
            skip_header: AtomicBool::new(false),
            quit,
        })
    }

    /// Treat emitted bytes as complete frames that already carry a meta line.
    pub fn set_skip_header(&self, skip: bool) {
        self.skip_header.store(skip, Ordering::Relaxed);
    }

    /// Queues one GET request.
    pub fn emit_get(&self) {
        self.emit_bytes(GET_PAYLOAD);
    }

    /// Queues one POST request with the body `a=1&b=2`.
    pub fn emit_post(&self) {
        self.emit_bytes(POST_PAYLOAD);
    }

    /// Queues one OPTIONS request.
    pub fn emit_options(&self) {
        self.emit_bytes(OPTIONS_PAYLOAD);
    }

    /// Queues raw bytes; a payload or a full frame depending on
    /// `set_skip_header`.
    pub fn emit_bytes(&self, bytes: impl Into<Bytes>) {
        let _ = self.tx.send(bytes.into());
    }

    /// Stops the input; pending and future reads return `Stopped`.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }
}

#[async_trait]
impl PluginReader for TestInput {
    async fn plugin_read(&self) -> Result<Message, RecastError> {
        if *self.quit.borrow() {
            return Err(RecastError::stopped());
        }
        let mut quit = self.quit.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = quit.changed() => Err(RecastError::stopped()),
            buf = rx.recv() => match buf {
                Some(buf) if self.skip_header.load(Ordering::Relaxed) => {
                    let (meta, data) = protocol::split_meta_and_body(&buf);
                    Ok(Message::new(meta, data))
                }
                Some(buf) => {
                    let meta = protocol::payload_header(
                        PayloadType::Request,
                        &protocol::uuid(),
                        protocol::now_nanos(),
                        -1,
                    );
                    Ok(Message::new(meta, buf))
                }
                None => Err(RecastError::stopped()),
            },
        }
    }
}
