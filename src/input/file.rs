use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::PluginReader;
use crate::protocol::{self, Message};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

/// Plays a separator-framed recording back into the pipeline.
///
/// Frames whose meta line does not start with a payload-type digit are
/// skipped; that is the resynchronization contract for corrupt recordings.
/// After the last frame, reads return `Stopped` unless loop playback is on.
#[derive(Debug)]
pub struct FileInput {
    path: PathBuf,
    rx: Mutex<mpsc::Receiver<Message>>,
    quit: watch::Sender<bool>,
}

impl FileInput {
    /// Opens the recording and starts the playback task.
    pub async fn new(path: &str, loop_playback: bool) -> Result<Arc<Self>, RecastError> {
        let path = PathBuf::from(path);
        tokio::fs::metadata(&path).await.map_err(|e| {
            RecastError::new(
                RecastErrorKind::Constructor,
                format!("input file {:?}: {}", path, e),
            )
        })?;

        let (tx, rx) = mpsc::channel(100);
        let (quit, quit_rx) = watch::channel(false);
        let reader_path = path.clone();
        tokio::spawn(async move {
            loop {
                let contents = match tokio::fs::read(&reader_path).await {
                    Ok(contents) => Bytes::from(contents),
                    Err(e) => {
                        tracing::warn!(path = ?reader_path, error = %e, "file input read failed");
                        return;
                    }
                };
                for frame in frames(&contents) {
                    if *quit_rx.borrow() {
                        return;
                    }
                    if tx.send(frame).await.is_err() {
                        return;
                    }
                }
                if !loop_playback {
                    return; // dropping tx ends the stream
                }
            }
        });

        Ok(Arc::new(FileInput {
            path,
            rx: Mutex::new(rx),
            quit,
        }))
    }

    /// The recording being replayed.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Stops playback.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }
}

fn frames(contents: &Bytes) -> Vec<Message> {
    let mut messages = Vec::new();
    for frame in protocol::split_frames(contents) {
        let start = frame.as_ptr() as usize - contents.as_ptr() as usize;
        let frame = contents.slice(start..start + frame.len());
        let (meta, data) = protocol::split_meta_and_body(&frame);
        if protocol::is_origin_payload(&meta) || meta.first() == Some(&b'3') {
            messages.push(Message::new(meta, data));
        } else {
            tracing::debug!("skipping unparseable frame in recording");
        }
    }
    messages
}

#[async_trait]
impl PluginReader for FileInput {
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
