use crate::error::RecastError;
use crate::plugin::PluginWriter;
use crate::protocol::Message;
use async_trait::async_trait;
use std::sync::Arc;

/// Discards everything, reporting the bytes it would have written.
pub struct NullOutput;

impl NullOutput {
    /// Creates the sink.
    pub fn new() -> Arc<Self> {
        Arc::new(NullOutput)
    }
}

#[async_trait]
impl PluginWriter for NullOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        Ok(msg.len())
    }
}
