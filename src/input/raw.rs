use crate::error::RecastError;
use crate::plugin::PluginReader;
use crate::proto;
use crate::protocol::{self, Message, PayloadType};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, watch, Mutex};

/// Which side of the captured connection produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirection {
    /// Traffic towards the captured service: a request.
    Incoming,
    /// Traffic from the captured service: a response.
    Outgoing,
}

/// One reassembled application-layer message from the capture engine.
///
/// The engine itself (pcap, AF_PACKET, a recorded trace) lives outside this
/// crate; it hands fully reassembled messages over a channel.
#[derive(Debug, Clone)]
pub struct CaptureMessage {
    /// Raw request or response bytes.
    pub data: Vec<u8>,
    /// Flow direction.
    pub direction: CaptureDirection,
    /// Source address of the captured packets.
    pub src_addr: String,
    /// Capture start time.
    pub start: SystemTime,
    /// Capture end time.
    pub end: SystemTime,
    /// Flow identifier; becomes the message correlation ID.
    pub uuid: Vec<u8>,
    /// The reassembler ran out of buffer before the message ended.
    pub truncated: bool,
    /// Reassembly gave up waiting for more segments.
    pub timed_out: bool,
}

/// Adapts a capture listener's message stream into a pipeline input.
pub struct RawInput {
    rx: Mutex<mpsc::Receiver<CaptureMessage>>,
    real_ip_header: Option<String>,
    quit: watch::Sender<bool>,
}

impl RawInput {
    /// Wraps the capture engine's channel. When `real_ip_header` is set, the
    /// captured source address is injected into each request under that
    /// header name.
    pub fn new(rx: mpsc::Receiver<CaptureMessage>, real_ip_header: Option<String>) -> Arc<Self> {
        let (quit, _) = watch::channel(false);
        Arc::new(RawInput {
            rx: Mutex::new(rx),
            real_ip_header,
            quit,
        })
    }

    /// Detaches from the capture stream.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }

    fn convert(&self, captured: CaptureMessage) -> Message {
        if captured.truncated {
            tracing::warn!("captured message truncated; increase the copy buffer size");
        }
        if captured.timed_out {
            tracing::warn!("captured message hit the reassembly timeout");
        }

        let payload_type = match captured.direction {
            CaptureDirection::Incoming => PayloadType::Request,
            CaptureDirection::Outgoing => PayloadType::Response,
        };
        let mut data = captured.data;
        if payload_type == PayloadType::Request {
            if let Some(header) = &self.real_ip_header {
                match proto::set_header(&data, header, captured.src_addr.as_bytes()) {
                    Ok(rewritten) => data = rewritten,
                    Err(e) => {
                        tracing::debug!(error = %e, "could not inject real-ip header");
                    }
                }
            }
        }

        let start = nanos(captured.start);
        let latency = match payload_type {
            PayloadType::Request => -1,
            _ => nanos(captured.end).saturating_sub(start),
        };
        let meta = protocol::payload_header(payload_type, &captured.uuid, start, latency);
        Message::new(meta, Bytes::from(data))
    }
}

fn nanos(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl PluginReader for RawInput {
    async fn plugin_read(&self) -> Result<Message, RecastError> {
        if *self.quit.borrow() {
            return Err(RecastError::stopped());
        }
        let mut quit = self.quit.subscribe();
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = quit.changed() => Err(RecastError::stopped()),
            captured = rx.recv() => match captured {
                Some(captured) => Ok(self.convert(captured)),
                None => Err(RecastError::stopped()),
            },
        }
    }
}
