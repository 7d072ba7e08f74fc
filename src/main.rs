use clap::Parser;
use recast::config::{HeaderRule, PipelineConfig, RewriteRule};
use recast::emitter::Emitter;
use recast::middleware::Middleware;
use recast::plugin;
use std::time::Duration;

/// Capture, transform, and replay HTTP/TCP traffic.
#[derive(Parser, Debug)]
#[command(name = "recast", version, about)]
struct Args {
    /// Emit one synthetic request/response pair per second.
    #[arg(long)]
    input_dummy: bool,

    /// Replay a recording; `path` or `path|limit`.
    #[arg(long, value_name = "PATH")]
    input_file: Vec<String>,

    /// Restart file playback when it ends.
    #[arg(long)]
    input_file_loop: bool,

    /// Listen for separator-framed aggregator feeds; `addr` or `addr|limit`.
    #[arg(long, value_name = "ADDR")]
    input_tcp: Vec<String>,

    /// Capture live requests on an HTTP listener; `addr` or `addr|limit`.
    #[arg(long, value_name = "ADDR")]
    input_http: Vec<String>,

    /// Frame every message to stdout.
    #[arg(long)]
    output_stdout: bool,

    /// Accept and discard everything.
    #[arg(long)]
    output_null: bool,

    /// Append framed messages to a file; `path` or `path|limit`.
    #[arg(long, value_name = "PATH")]
    output_file: Vec<String>,

    /// Forward framed origin traffic over TCP; `addr` or `addr|limit`.
    #[arg(long, value_name = "ADDR")]
    output_tcp: Vec<String>,

    /// Keep each captured flow on one TCP worker connection.
    #[arg(long)]
    output_tcp_sticky: bool,

    /// TCP worker connections per output.
    #[arg(long, default_value_t = 1)]
    output_tcp_workers: usize,

    /// Replay requests against an HTTP endpoint; `url` or `url|limit`.
    #[arg(long, value_name = "URL")]
    output_http: Vec<String>,

    /// HTTP replay worker floor.
    #[arg(long, default_value_t = 1)]
    output_http_workers: usize,

    /// HTTP replay worker ceiling; 0 means twice the CPU count.
    #[arg(long, default_value_t = 0)]
    output_http_workers_max: usize,

    /// Per-request replay deadline in milliseconds.
    #[arg(long, default_value_t = 5000)]
    output_http_timeout_ms: u64,

    /// Redirect hops to follow; 0 returns 3xx as-is.
    #[arg(long, default_value_t = 0)]
    output_http_redirects: usize,

    /// Bounded replay queue length.
    #[arg(long, default_value_t = 1000)]
    output_http_queue_len: usize,

    /// Workers spawned per elastic growth event.
    #[arg(long, default_value_t = 1)]
    output_http_elastic_step: usize,

    /// Keep the captured Host header on replayed requests.
    #[arg(long)]
    http_original_host: bool,

    /// Skip TLS verification on the replay endpoint.
    #[arg(long)]
    output_http_skip_verify: bool,

    /// Feed replay responses back into the pipeline as payload type 3.
    #[arg(long)]
    output_http_track_responses: bool,

    /// Collect replay latency samples.
    #[arg(long)]
    output_http_stats: bool,

    /// Force a header on replayed requests, as `Name: value`.
    #[arg(long, value_name = "HEADER")]
    http_set_header: Vec<String>,

    /// Strip a header from replayed requests.
    #[arg(long, value_name = "NAME")]
    http_del_header: Vec<String>,

    /// Replay only these methods; repeat to allow several.
    #[arg(long, value_name = "METHOD")]
    http_allow_method: Vec<String>,

    /// Rewrite the request path, as `pattern:replacement`.
    #[arg(long, value_name = "RULE")]
    http_rewrite_url: Vec<String>,

    /// Inject basic auth on replayed requests, as `user:password`.
    #[arg(long, value_name = "CREDENTIALS")]
    http_basic_auth: Option<String>,

    /// Send each message to exactly one output.
    #[arg(long)]
    split_output: bool,

    /// With --split-output, keep each captured flow on one output.
    #[arg(long)]
    recognize_tcp_sessions: bool,

    /// Pipe traffic through this middleware command.
    #[arg(long, value_name = "COMMAND", default_value = "")]
    middleware: String,

    /// Log pipeline counters every few seconds.
    #[arg(long)]
    stats: bool,
}

fn build_config(args: &Args) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    if args.input_dummy {
        config.input_dummy.push(String::new());
    }
    config.input_file = args.input_file.clone();
    config.input_file_loop = args.input_file_loop;
    config.input_tcp = args.input_tcp.clone();
    config.input_http = args.input_http.clone();
    config.output_stdout = args.output_stdout;
    config.output_null = args.output_null;
    config.output_file = args.output_file.clone();
    config.output_tcp = args.output_tcp.clone();
    config.output_http = args.output_http.clone();

    config.output_tcp_config.sticky = args.output_tcp_sticky;
    config.output_tcp_config.workers = args.output_tcp_workers.max(1);

    config.output_http_config.workers = args.output_http_workers;
    config.output_http_config.workers_max = args.output_http_workers_max;
    config.output_http_config.timeout = Duration::from_millis(args.output_http_timeout_ms);
    config.output_http_config.redirect_limit = args.output_http_redirects;
    config.output_http_config.queue_len = args.output_http_queue_len;
    config.output_http_config.elastic_step = args.output_http_elastic_step;
    config.output_http_config.original_host = args.http_original_host;
    config.output_http_config.skip_verify = args.output_http_skip_verify;
    config.output_http_config.track_responses = args.output_http_track_responses;
    config.output_http_config.stats = args.output_http_stats;

    for header in &args.http_set_header {
        if let Some((name, value)) = header.split_once(':') {
            config.modifier.headers.push(HeaderRule {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            });
        } else {
            tracing::warn!(header = %header, "ignoring header without a colon");
        }
    }
    config.modifier.header_deletes = args.http_del_header.clone();
    config.modifier.methods = args.http_allow_method.clone();
    for rule in &args.http_rewrite_url {
        if let Some((pattern, replacement)) = rule.split_once(':') {
            config.modifier.url_rewrites.push(RewriteRule {
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
            });
        } else {
            tracing::warn!(rule = %rule, "ignoring rewrite without a colon");
        }
    }
    config.modifier.basic_auth = args.http_basic_auth.clone();

    config.split_output = args.split_output;
    config.recognize_tcp_sessions = args.recognize_tcp_sessions;
    config.middleware = args.middleware.clone();
    config.stats = args.stats;
    config
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let config = build_config(&args);

    let plugins = match plugin::new_plugins(&config).await {
        Ok(plugins) => std::sync::Arc::new(plugins),
        Err(e) => {
            tracing::error!(error = %e, "plugin construction failed");
            std::process::exit(1);
        }
    };
    if plugins.inputs.is_empty() || plugins.outputs.is_empty() {
        tracing::error!("configure at least one input and one output");
        std::process::exit(1);
    }

    let middleware = if config.middleware.is_empty() {
        None
    } else {
        Some(Middleware::command(config.middleware.clone()))
    };

    let emitter = Emitter::new(&config);
    emitter.start(plugins, middleware);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "signal handler failed");
    }
    tracing::info!("shutting down");
    emitter.close().await;
}
