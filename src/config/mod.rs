use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable pipeline configuration.
///
/// Built once (by the binary from its flags, or by tests directly) and passed
/// by reference to [`crate::plugin::new_plugins`] and
/// [`crate::emitter::Emitter::new`]. Nothing mutates it afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Dummy inputs (one synthetic request/response pair per second each).
    pub input_dummy: Vec<String>,
    /// Recorded files to replay, `path` or `path|limit`.
    pub input_file: Vec<String>,
    /// Restart file playback from the top when it ends.
    pub input_file_loop: bool,
    /// TCP listen addresses accepting separator-framed aggregator feeds.
    pub input_tcp: Vec<String>,
    /// HTTP listen addresses capturing live requests.
    pub input_http: Vec<String>,

    /// Frame every message to stdout.
    pub output_stdout: bool,
    /// Accept and discard everything.
    pub output_null: bool,
    /// Append separator-framed messages to these files.
    pub output_file: Vec<String>,
    /// Forward framed origin traffic to these TCP aggregators.
    pub output_tcp: Vec<String>,
    /// Replay requests against these HTTP endpoints.
    pub output_http: Vec<String>,

    /// Options shared by every TCP output.
    pub output_tcp_config: TcpOutputConfig,
    /// Options shared by every HTTP output.
    pub output_http_config: HttpOutputConfig,
    /// Request rewrite rules applied by HTTP outputs before dispatch.
    pub modifier: ModifierConfig,

    /// Send each message to exactly one output instead of all of them.
    pub split_output: bool,
    /// With `split_output`, route by correlation-ID prefix so every message
    /// of one captured flow lands on the same output.
    pub recognize_tcp_sessions: bool,

    /// External middleware command; empty disables the bridge.
    pub middleware: String,
    /// Log pipeline counters on a ticker.
    pub stats: bool,
    /// How long `close` waits for in-flight work before abandoning it.
    #[serde(with = "duration_millis")]
    pub close_grace: Duration,
}

impl PipelineConfig {
    /// Grace period applied when the configured one is zero.
    pub fn effective_close_grace(&self) -> Duration {
        if self.close_grace.is_zero() {
            Duration::from_secs(5)
        } else {
            self.close_grace
        }
    }
}

/// Options for the TCP aggregator output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpOutputConfig {
    /// Route by correlation-ID hash instead of round-robin, keeping each
    /// captured flow on one worker connection.
    pub sticky: bool,
    /// Number of keep-alive worker connections.
    pub workers: usize,
}

impl Default for TcpOutputConfig {
    fn default() -> Self {
        TcpOutputConfig {
            sticky: false,
            workers: 1,
        }
    }
}

/// Options for the HTTP replay output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOutputConfig {
    /// Maximum 3xx hops to follow; `0` returns redirects as-is.
    pub redirect_limit: usize,
    /// Worker floor kept alive even when idle.
    pub workers: usize,
    /// Worker ceiling; `0` resolves to twice the CPU count.
    pub workers_max: usize,
    /// Per-request deadline.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Keep the captured `Host` header instead of deriving it from the
    /// replay URL.
    pub original_host: bool,
    /// Skip TLS certificate verification on the replay endpoint.
    pub skip_verify: bool,
    /// Capture replay responses and feed them back into the pipeline as
    /// `payloadType=3` messages.
    pub track_responses: bool,
    /// Collect per-request latency samples.
    pub stats: bool,
    /// Bounded request queue length.
    pub queue_len: usize,
    /// Workers spawned per growth event while the queue is under pressure.
    pub elastic_step: usize,
}

impl Default for HttpOutputConfig {
    fn default() -> Self {
        HttpOutputConfig {
            redirect_limit: 0,
            workers: 1,
            workers_max: 0,
            timeout: Duration::from_secs(5),
            original_host: false,
            skip_verify: false,
            track_responses: false,
            stats: false,
            queue_len: 1000,
            elastic_step: 1,
        }
    }
}

/// A header to force onto every replayed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderRule {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// A regex rewrite applied to the request path (or body).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteRule {
    /// Pattern matched against the target.
    pub pattern: String,
    /// Replacement, with `$1`-style capture references.
    pub replacement: String,
}

/// Declarative request rewrite rules; see [`crate::modifier::HttpModifier`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModifierConfig {
    /// Headers to set (replacing any captured value).
    pub headers: Vec<HeaderRule>,
    /// Headers to remove.
    pub header_deletes: Vec<String>,
    /// Method allowlist; a non-empty list drops every other method.
    pub methods: Vec<String>,
    /// Path rewrites, applied in order.
    pub url_rewrites: Vec<RewriteRule>,
    /// `user:password` to inject as a basic-auth `Authorization` header.
    pub basic_auth: Option<String>,
    /// Body rewrites, applied in order.
    pub body_rewrites: Vec<RewriteRule>,
}

impl ModifierConfig {
    /// True when no rule is configured at all.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.header_deletes.is_empty()
            && self.methods.is_empty()
            && self.url_rewrites.is_empty()
            && self.basic_auth.is_none()
            && self.body_rewrites.is_empty()
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
