use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::PluginWriter;
use crate::protocol::{Message, PAYLOAD_SEPARATOR};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends separator-framed messages to a recording file.
pub struct FileOutput {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileOutput {
    /// Opens (or creates) the recording in append mode.
    pub async fn new(path: &str) -> Result<Arc<Self>, RecastError> {
        let path = PathBuf::from(path);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                RecastError::new(
                    RecastErrorKind::Constructor,
                    format!("output file {:?}: {}", path, e),
                )
            })?;
        Ok(Arc::new(FileOutput {
            path,
            file: Mutex::new(file),
        }))
    }

    /// The recording being written.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl PluginWriter for FileOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        let mut frame = Vec::with_capacity(msg.len() + PAYLOAD_SEPARATOR.len());
        frame.extend_from_slice(&msg.meta);
        frame.extend_from_slice(&msg.data);
        frame.extend_from_slice(PAYLOAD_SEPARATOR);
        let mut file = self.file.lock().await;
        file.write_all(&frame).await?;
        file.flush().await?;
        Ok(frame.len())
    }
}
