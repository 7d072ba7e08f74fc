use crate::config::HttpOutputConfig;
use crate::error::{RecastError, RecastErrorKind};
use crate::modifier::HttpModifier;
use crate::plugin::{PluginReader, PluginWriter};
use crate::proto;
use crate::protocol::{self, Message, PayloadType};
use crate::stats::LatencyRing;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use url::Url;

/// How long an idle surplus worker waits for work before exiting.
const IDLE_GRACE: Duration = Duration::from_secs(2);
/// Minimum spacing between elastic growth events.
const SPAWN_INTERVAL: Duration = Duration::from_millis(100);
/// Buffered replay responses waiting to re-enter the pipeline.
const RESPONSE_QUEUE: usize = 1000;

/// Headers that describe the captured hop, not the message; never replayed.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

/// Replays captured requests against an HTTP endpoint.
///
/// Requests queue into a bounded MPMC channel consumed by an elastic worker
/// pool: the pool grows while the queue is under pressure (capped at
/// `workers_max`) and shrinks back to the floor after idleness. A full queue
/// drops the oldest entry instead of blocking the emitter.
///
/// With `track_responses` the output is also a reader: every replay response
/// is tagged `payloadType=3` and handed back to the pipeline.
pub struct HttpOutput {
    inner: Arc<Inner>,
}

struct Inner {
    address: Url,
    config: HttpOutputConfig,
    client: reqwest::Client,
    modifier: Option<Arc<HttpModifier>>,
    queue_tx: async_channel::Sender<Message>,
    queue_rx: async_channel::Receiver<Message>,
    active_workers: AtomicUsize,
    started: Instant,
    last_spawn_ms: AtomicU64,
    sent: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    transport_errors: AtomicU64,
    latency: Option<LatencyRing>,
    responses_tx: mpsc::Sender<Message>,
    responses_rx: Mutex<mpsc::Receiver<Message>>,
    quit: watch::Sender<bool>,
}

impl HttpOutput {
    /// Builds the replay client and starts the worker floor.
    pub fn new(
        address: &str,
        mut config: HttpOutputConfig,
        modifier: Option<Arc<HttpModifier>>,
    ) -> Result<Arc<Self>, RecastError> {
        let address = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{}", address)
        };
        let address = Url::parse(&address)?;

        if config.workers == 0 {
            config.workers = 1;
        }
        if config.workers_max == 0 {
            config.workers_max = num_cpus::get() * 2;
        }
        if config.workers_max < config.workers {
            config.workers_max = config.workers;
        }
        if config.queue_len == 0 {
            config.queue_len = 1000;
        }
        if config.elastic_step == 0 {
            config.elastic_step = 1;
        }

        let redirects = if config.redirect_limit == 0 {
            reqwest::redirect::Policy::none()
        } else {
            reqwest::redirect::Policy::limited(config.redirect_limit)
        };
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(redirects)
            .danger_accept_invalid_certs(config.skip_verify)
            .build()
            .map_err(|e| {
                RecastError::new(
                    RecastErrorKind::Constructor,
                    format!("http output client: {}", e),
                )
            })?;

        let (queue_tx, queue_rx) = async_channel::bounded(config.queue_len);
        let (responses_tx, responses_rx) = mpsc::channel(RESPONSE_QUEUE);
        let (quit, _) = watch::channel(false);
        let latency = config.stats.then(|| LatencyRing::new(5000));

        let inner = Arc::new(Inner {
            address,
            config,
            client,
            modifier,
            queue_tx,
            queue_rx,
            active_workers: AtomicUsize::new(0),
            started: Instant::now(),
            last_spawn_ms: AtomicU64::new(0),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            latency,
            responses_tx,
            responses_rx: Mutex::new(responses_rx),
            quit,
        });
        for _ in 0..inner.config.workers {
            Inner::spawn_worker(&inner);
        }
        Ok(Arc::new(HttpOutput { inner }))
    }

    /// The resolved replay destination.
    pub fn address(&self) -> &Url {
        &self.inner.address
    }

    /// The resolved configuration (defaults filled in).
    pub fn config(&self) -> &HttpOutputConfig {
        &self.inner.config
    }

    /// Whether this output feeds replay responses back as an input.
    pub fn track_responses(&self) -> bool {
        self.inner.config.track_responses
    }

    /// Requests replayed so far.
    pub fn sent(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Messages dropped at ingress because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Messages the modifier filtered out.
    pub fn filtered(&self) -> u64 {
        self.inner.filtered.load(Ordering::Relaxed)
    }

    /// Replay attempts that failed at the transport level.
    pub fn transport_errors(&self) -> u64 {
        self.inner.transport_errors.load(Ordering::Relaxed)
    }

    /// Current worker count.
    pub fn workers(&self) -> usize {
        self.inner.active_workers.load(Ordering::Relaxed)
    }

    /// Queued requests not yet dispatched.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue_tx.len()
    }

    /// Latency percentile over the sample ring, when `stats` is on.
    pub fn latency_percentile(&self, percentile: f64) -> Option<Duration> {
        self.inner
            .latency
            .as_ref()
            .and_then(|ring| ring.percentile(percentile))
    }

    /// Stops the pool; queued work is drained, then workers exit.
    pub fn close(&self) {
        let _ = self.inner.quit.send(true);
        self.inner.queue_rx.close();
    }
}

impl Inner {
    fn spawn_worker(this: &Arc<Inner>) {
        this.active_workers.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(this);
        tokio::spawn(async move { inner.worker_loop().await });
    }

    async fn worker_loop(&self) {
        let mut quit = self.quit.subscribe();
        loop {
            if *quit.borrow() {
                // drain whatever is queued, then leave
                while let Ok(msg) = self.queue_rx.try_recv() {
                    self.replay(msg).await;
                }
                self.active_workers.fetch_sub(1, Ordering::SeqCst);
                return;
            }
            tokio::select! {
                _ = quit.changed() => continue,
                queued = tokio::time::timeout(IDLE_GRACE, self.queue_rx.recv()) => match queued {
                    Ok(Ok(msg)) => self.replay(msg).await,
                    Ok(Err(_)) => {
                        self.active_workers.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                    Err(_idle) => {
                        if self.try_shrink() {
                            return;
                        }
                    }
                },
            }
        }
    }

    /// CAS-guarded so simultaneous idle timeouts cannot shrink the pool
    /// below the configured floor.
    fn try_shrink(&self) -> bool {
        loop {
            let current = self.active_workers.load(Ordering::SeqCst);
            if current <= self.config.workers {
                return false;
            }
            if self
                .active_workers
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn maybe_grow(this: &Arc<Inner>) {
        let fill = this.queue_tx.len();
        if fill * 4 < this.config.queue_len * 3 {
            return;
        }
        let active = this.active_workers.load(Ordering::SeqCst);
        if active >= this.config.workers_max {
            return;
        }
        let now_ms = this.started.elapsed().as_millis() as u64;
        let last = this.last_spawn_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(last) < SPAWN_INTERVAL.as_millis() as u64 {
            return;
        }
        if this
            .last_spawn_ms
            .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let step = this.config.elastic_step.min(this.config.workers_max - active);
        tracing::debug!(fill, active, step, "http output queue under pressure, growing pool");
        for _ in 0..step {
            Inner::spawn_worker(this);
        }
    }

    async fn replay(&self, msg: Message) {
        let data = match &self.modifier {
            Some(modifier) => match modifier.apply(&msg.data) {
                Ok(Some(rewritten)) => rewritten,
                Ok(None) => {
                    self.filtered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "modifier rejected request payload");
                    return;
                }
            },
            None => msg.data.clone(),
        };

        let request = match self.build_request(&data) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(error = %e, "unreplayable request payload");
                return;
            }
        };

        let started = Instant::now();
        match request.send().await {
            Ok(response) => {
                let elapsed = started.elapsed();
                self.sent.fetch_add(1, Ordering::Relaxed);
                if let Some(ring) = &self.latency {
                    ring.record(elapsed);
                }
                if self.config.track_responses {
                    self.track(&msg, response, elapsed).await;
                }
            }
            Err(e) => {
                self.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(error = %e, "replay request failed");
            }
        }
    }

    fn build_request(&self, data: &Bytes) -> Result<reqwest::RequestBuilder, RecastError> {
        let info = proto::parse_request(data)?;
        let method = reqwest::Method::from_bytes(info.method.as_bytes()).map_err(|_| {
            RecastError::new(
                RecastErrorKind::MalformedMeta,
                format!("bad method: {:?}", info.method),
            )
        })?;
        let url = self.address.join(info.path)?;

        let mut request = self.client.request(method, url);
        for (name, value) in &info.headers {
            if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            if name.eq_ignore_ascii_case("host") {
                if self.config.original_host {
                    request = request.header(reqwest::header::HOST, *value);
                }
                continue;
            }
            if name.eq_ignore_ascii_case("content-length") {
                // the client derives it from the body we attach
                continue;
            }
            request = request.header(*name, *value);
        }
        if !info.body.is_empty() {
            let offset = data.len() - info.body.len();
            request = request.body(data.slice(offset..));
        }
        Ok(request)
    }

    async fn track(&self, request: &Message, response: reqwest::Response, elapsed: Duration) {
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.unwrap_or_default();

        let mut raw = Vec::with_capacity(body.len() + 256);
        raw.extend_from_slice(b"HTTP/1.1 ");
        raw.extend_from_slice(status.as_str().as_bytes());
        if let Some(reason) = status.canonical_reason() {
            raw.push(b' ');
            raw.extend_from_slice(reason.as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        for (name, value) in &headers {
            raw.extend_from_slice(name.as_str().as_bytes());
            raw.extend_from_slice(b": ");
            raw.extend_from_slice(value.as_bytes());
            raw.extend_from_slice(b"\r\n");
        }
        raw.extend_from_slice(b"\r\n");
        raw.extend_from_slice(&body);

        let meta = protocol::payload_header(
            PayloadType::ReplayedResponse,
            request.id(),
            protocol::now_nanos(),
            elapsed.as_nanos() as i64,
        );
        if self
            .responses_tx
            .try_send(Message::new(meta, raw))
            .is_err()
        {
            tracing::debug!("response channel full, dropping tracked response");
        }
    }
}

#[async_trait]
impl PluginWriter for HttpOutput {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        // responses never replay; this also keeps tracked responses (type 3)
        // from looping back through the pool
        if !protocol::is_request_payload(&msg.meta) {
            return Ok(0);
        }
        let mut queued = msg.clone();
        loop {
            match self.inner.queue_tx.try_send(queued) {
                Ok(()) => break,
                Err(async_channel::TrySendError::Full(back)) => {
                    // fail fast at ingress: shed the oldest, keep the newest
                    let _ = self.inner.queue_rx.try_recv();
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    queued = back;
                }
                Err(async_channel::TrySendError::Closed(_)) => {
                    return Err(RecastError::new(
                        RecastErrorKind::QueueFull,
                        "http output request queue closed",
                    ));
                }
            }
        }
        Inner::maybe_grow(&self.inner);
        Ok(msg.len())
    }
}

#[async_trait]
impl PluginReader for HttpOutput {
    async fn plugin_read(&self) -> Result<Message, RecastError> {
        if !self.inner.config.track_responses || *self.inner.quit.borrow() {
            return Err(RecastError::stopped());
        }
        let mut quit = self.inner.quit.subscribe();
        let mut rx = self.inner.responses_rx.lock().await;
        tokio::select! {
            _ = quit.changed() => Err(RecastError::stopped()),
            msg = rx.recv() => msg.ok_or_else(RecastError::stopped),
        }
    }
}
