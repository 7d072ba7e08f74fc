use crate::error::RecastError;
use crate::plugin::PluginWriter;
use crate::protocol::{Message, PAYLOAD_SEPARATOR};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Frames every message to stdout, for eyeballing a live pipeline.
pub struct StdoutOutput;

impl StdoutOutput {
    /// Creates the sink.
    pub fn new() -> Arc<Self> {
        Arc::new(StdoutOutput)
    }
}

#[async_trait]
impl PluginWriter for StdoutOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        let mut frame = Vec::with_capacity(msg.len() + PAYLOAD_SEPARATOR.len());
        frame.extend_from_slice(&msg.meta);
        frame.extend_from_slice(&msg.data);
        frame.extend_from_slice(PAYLOAD_SEPARATOR);
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&frame).await?;
        stdout.flush().await?;
        Ok(frame.len())
    }
}
