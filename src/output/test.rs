use crate::error::RecastError;
use crate::plugin::PluginWriter;
use crate::protocol::Message;
use async_trait::async_trait;
use std::sync::Arc;

type WriteCallback = dyn Fn(&Message) + Send + Sync;

/// Intercepts every write into a callback; the test suite's sink.
pub struct TestOutput {
    cb: Box<WriteCallback>,
}

impl TestOutput {
    /// Creates a sink invoking `cb` on each incoming message.
    pub fn new(cb: impl Fn(&Message) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(TestOutput { cb: Box::new(cb) })
    }
}

#[async_trait]
impl PluginWriter for TestOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        (self.cb)(msg);
        Ok(msg.len())
    }
}
