use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::PluginReader;
use crate::protocol::{self, Message, PayloadType};
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};

/// Captures live traffic on an HTTP listener.
///
/// Every accepted request is serialized back to raw HTTP/1.1 bytes, stamped
/// with a fresh correlation ID, and emitted as a request payload. The caller
/// gets an empty 200 regardless of what the pipeline does with the copy.
pub struct HttpInput {
    address: SocketAddr,
    rx: Mutex<mpsc::Receiver<Message>>,
    quit: watch::Sender<bool>,
}

impl HttpInput {
    /// Binds the listener and starts serving.
    pub async fn new(address: &str) -> Result<Arc<Self>, RecastError> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            RecastError::new(
                RecastErrorKind::Constructor,
                format!("http input bind {}: {}", address, e),
            )
        })?;
        let address = listener
            .local_addr()
            .map_err(|e| RecastError::new(RecastErrorKind::Constructor, e.to_string()))?;

        let (tx, rx) = mpsc::channel(1000);
        let (quit, mut quit_rx) = watch::channel(false);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = quit_rx.changed() => return,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => {
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                let io = TokioIo::new(stream);
                                let service = service_fn(move |req| capture(req, tx.clone()));
                                if let Err(e) = http1::Builder::new()
                                    .serve_connection(io, service)
                                    .await
                                {
                                    tracing::debug!(error = %e, "http input connection error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "http input accept failed");
                        }
                    },
                }
            }
        });

        Ok(Arc::new(HttpInput {
            address,
            rx: Mutex::new(rx),
            quit,
        }))
    }

    /// The address the listener actually bound (useful with port `0`).
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stops accepting requests.
    pub fn close(&self) {
        let _ = self.quit.send(true);
    }
}

async fn capture(
    req: Request<Incoming>,
    tx: mpsc::Sender<Message>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::debug!(error = %e, "http input dropped request with broken body");
            return Ok(Response::new(Full::new(Bytes::new())));
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut raw = Vec::with_capacity(body.len() + 256);
    raw.extend_from_slice(parts.method.as_str().as_bytes());
    raw.push(b' ');
    raw.extend_from_slice(path.as_bytes());
    raw.extend_from_slice(b" HTTP/1.1\r\n");
    let mut has_content_length = false;
    for (name, value) in &parts.headers {
        // the body arrives fully collected, so chunked framing is gone
        if name == &hyper::header::TRANSFER_ENCODING {
            continue;
        }
        if name == &hyper::header::CONTENT_LENGTH {
            has_content_length = true;
        }
        raw.extend_from_slice(name.as_str().as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(value.as_bytes());
        raw.extend_from_slice(b"\r\n");
    }
    if !body.is_empty() && !has_content_length {
        raw.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    raw.extend_from_slice(b"\r\n");
    raw.extend_from_slice(&body);

    let meta = protocol::payload_header(
        PayloadType::Request,
        &protocol::uuid(),
        protocol::now_nanos(),
        -1,
    );
    if tx.send(Message::new(meta, raw)).await.is_err() {
        tracing::debug!("http input channel closed; dropping captured request");
    }
    Ok(Response::new(Full::new(Bytes::new())))
}

#[async_trait]
impl PluginReader for HttpInput {
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
