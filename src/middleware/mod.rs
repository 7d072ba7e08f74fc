use crate::emitter::Router;
use crate::error::{RecastError, RecastErrorKind};
use crate::protocol::{self, Message};
use bytes::Bytes;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Capacity of the channel feeding inbound messages to the middleware.
const FEED_QUEUE: usize = 1000;

type TransformFn = dyn Fn(&Message) -> Vec<Message> + Send + Sync;

/// Transformation stage spliced between inputs and routing.
///
/// The production variant is an external subprocess speaking the hex-line
/// protocol over stdio: one `hex(meta ‖ data)` line per inbound message on
/// its stdin, zero or more lines of the same shape on its stdout, each
/// becoming a new message for the router. Tests substitute an in-memory
/// function with the same contract.
pub enum Middleware {
    /// Spawn this command line and bridge it over stdio.
    Command(String),
    /// In-memory transform, mainly for tests.
    Function(Arc<TransformFn>),
}

impl Middleware {
    /// Middleware backed by a subprocess.
    pub fn command(cmd: impl Into<String>) -> Self {
        Middleware::Command(cmd.into())
    }

    /// Middleware backed by a function; each inbound message maps to zero
    /// or more routed messages.
    pub fn function(f: impl Fn(&Message) -> Vec<Message> + Send + Sync + 'static) -> Self {
        Middleware::Function(Arc::new(f))
    }

    /// Starts the bridge. Returns the sender the emitter's copy tasks feed;
    /// transformed messages flow into `router`.
    pub(crate) fn start(
        self,
        router: Arc<Router>,
        quit: watch::Receiver<bool>,
        tasks: &mut Vec<JoinHandle<()>>,
    ) -> Result<mpsc::Sender<Message>, RecastError> {
        let (feed_tx, feed_rx) = mpsc::channel(FEED_QUEUE);
        match self {
            Middleware::Function(f) => {
                tasks.push(tokio::spawn(run_function(f, feed_rx, router, quit)));
            }
            Middleware::Command(cmd) => {
                let mut parts = cmd.split_whitespace();
                let program = parts.next().ok_or_else(|| {
                    RecastError::new(RecastErrorKind::Constructor, "empty middleware command")
                })?;
                let mut child = Command::new(program)
                    .args(parts)
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true)
                    .spawn()
                    .map_err(|e| {
                        RecastError::new(
                            RecastErrorKind::Constructor,
                            format!("middleware {:?}: {}", cmd, e),
                        )
                    })?;
                let stdin = child.stdin.take();
                let stdout = child.stdout.take();
                let stderr = child.stderr.take();
                tracing::info!(command = %cmd, "middleware started");

                if let Some(stdin) = stdin {
                    tasks.push(tokio::spawn(feed_child(stdin, feed_rx, quit.clone())));
                }
                if let Some(stdout) = stdout {
                    tasks.push(tokio::spawn(read_child(stdout, router, quit.clone())));
                }
                if let Some(stderr) = stderr {
                    tasks.push(tokio::spawn(log_child_stderr(stderr)));
                }
                tasks.push(tokio::spawn(reap_child(child, quit)));
            }
        }
        Ok(feed_tx)
    }
}

/// Encodes a message as one protocol line, newline included.
pub fn encode_line(msg: &Message) -> Vec<u8> {
    let mut line = Vec::with_capacity((msg.len()) * 2 + 1);
    line.extend_from_slice(hex::encode(&msg.meta).as_bytes());
    line.extend_from_slice(hex::encode(&msg.data).as_bytes());
    line.push(b'\n');
    line
}

/// Decodes one protocol line back into a message.
pub fn decode_line(line: &str) -> Result<Message, RecastError> {
    let raw = hex::decode(line.trim())?;
    let frame = Bytes::from(raw);
    let (meta, data) = protocol::split_meta_and_body(&frame);
    if meta.is_empty() {
        return Err(RecastError::new(
            RecastErrorKind::MalformedMeta,
            "middleware reply without meta line",
        ));
    }
    Ok(Message::new(meta, data))
}

async fn run_function(
    f: Arc<TransformFn>,
    mut feed_rx: mpsc::Receiver<Message>,
    router: Arc<Router>,
    mut quit: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = quit.changed() => return,
            msg = feed_rx.recv() => match msg {
                Some(msg) => {
                    for transformed in f(&msg) {
                        router.route(&transformed).await;
                    }
                }
                None => return,
            },
        }
    }
}

async fn feed_child(
    mut stdin: tokio::process::ChildStdin,
    mut feed_rx: mpsc::Receiver<Message>,
    mut quit: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = quit.changed() => return,
            msg = feed_rx.recv() => match msg {
                Some(msg) => {
                    if let Err(e) = stdin.write_all(&encode_line(&msg)).await {
                        tracing::warn!(error = %e, "middleware stdin closed");
                        return;
                    }
                }
                None => return,
            },
        }
    }
}

async fn read_child(
    stdout: tokio::process::ChildStdout,
    router: Arc<Router>,
    mut quit: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            _ = quit.changed() => return,
            line = lines.next_line() => match line {
                Ok(Some(line)) => match decode_line(&line) {
                    Ok(msg) => router.route(&msg).await,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping malformed middleware reply");
                    }
                },
                Ok(None) => {
                    tracing::info!("middleware closed its stdout");
                    return;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "middleware stdout read failed");
                    return;
                }
            },
        }
    }
}

async fn log_child_stderr(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(target: "recast::middleware", "{}", line);
    }
}

async fn reap_child(mut child: tokio::process::Child, mut quit: watch::Receiver<bool>) {
    tokio::select! {
        _ = quit.changed() => {
            if let Err(e) = child.kill().await {
                tracing::debug!(error = %e, "middleware already gone");
            }
        }
        status = child.wait() => match status {
            Ok(status) => tracing::info!(%status, "middleware exited"),
            Err(e) => tracing::warn!(error = %e, "middleware wait failed"),
        },
    }
}
