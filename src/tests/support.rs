//! Shared fixtures for the pipeline tests.

use crate::output::TestOutput;
use crate::protocol::Message;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A sink that forwards every written message into a channel.
pub fn channel_output() -> (Arc<TestOutput>, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let output = TestOutput::new(move |msg| {
        let _ = tx.send(msg.clone());
    });
    (output, rx)
}

/// Receives exactly `n` messages, failing the test after 5 seconds.
pub async fn recv_n(rx: &mut mpsc::UnboundedReceiver<Message>, n: usize) -> Vec<Message> {
    let mut received = Vec::with_capacity(n);
    for i in 0..n {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for message {} of {}", i + 1, n))
            .expect("message channel closed early");
        received.push(msg);
    }
    received
}

/// Asserts that nothing further arrives within `wait`.
pub async fn assert_no_more<T>(rx: &mut mpsc::UnboundedReceiver<T>, wait: Duration) {
    assert!(
        tokio::time::timeout(wait, rx.recv()).await.is_err(),
        "unexpected extra message"
    );
}

/// What the stub replay server saw for one request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub host: String,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }
}

/// Spawns an HTTP stub that records every request and answers
/// `200 OK` with a small body. Returns its base URL.
pub async fn spawn_stub_server() -> (String, mpsc::UnboundedReceiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("stub server bind");
    let addr = listener.local_addr().expect("stub server addr");
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let tx = tx.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let body = body
                            .collect()
                            .await
                            .map(|collected| collected.to_bytes())
                            .unwrap_or_default();
                        let recorded = RecordedRequest {
                            method: parts.method.as_str().to_string(),
                            path: parts
                                .uri
                                .path_and_query()
                                .map(|pq| pq.as_str().to_string())
                                .unwrap_or_else(|| "/".to_string()),
                            host: parts
                                .headers
                                .get(hyper::header::HOST)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string(),
                            headers: parts
                                .headers
                                .iter()
                                .map(|(n, v)| (n.as_str().to_string(), v.as_bytes().to_vec()))
                                .collect(),
                            body: body.to_vec(),
                        };
                        let _ = tx.send(recorded);
                        Ok::<_, Infallible>(Response::new(Full::new(Bytes::from_static(
                            b"stub reply",
                        ))))
                    }
                });
                let io = TokioIo::new(stream);
                let _ = http1::Builder::new().serve_connection(io, service).await;
            });
        }
    });

    (format!("http://{}", addr), rx)
}
