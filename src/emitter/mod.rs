use crate::config::PipelineConfig;
use crate::error::RecastErrorKind;
use crate::middleware::Middleware;
use crate::plugin::{InOutPlugins, PluginReader, PluginWriter};
use crate::protocol::{self, Message};
use crate::stats::PipelineStats;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Backoff after a read error that is neither `Stopped` nor a limiter skip.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(100);
/// Cadence of the stats reporter when enabled.
const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Where a copy task delivers the messages it reads.
enum Sink {
    Direct(Arc<Router>),
    Middleware(mpsc::Sender<Message>),
}

/// Routing policy applied to every message entering the fan-out stage.
pub(crate) struct Router {
    outputs: Vec<Arc<dyn PluginWriter>>,
    split_output: bool,
    recognize_tcp_sessions: bool,
    round_robin: AtomicUsize,
    stats: Arc<PipelineStats>,
}

impl Router {
    /// Sends one message to all outputs, or to exactly one under a split
    /// policy. Write failures are counted and logged; they never stall the
    /// pipeline.
    pub(crate) async fn route(&self, msg: &Message) {
        if self.outputs.is_empty() {
            return;
        }
        if !self.split_output {
            for output in &self.outputs {
                self.write_to(output, msg).await;
            }
            return;
        }
        let index = if self.recognize_tcp_sessions {
            let id = protocol::payload_id(&msg.meta);
            let flow = &id[..id.len().min(20)];
            protocol::fnv32a(flow) as usize % self.outputs.len()
        } else {
            self.round_robin.fetch_add(1, Ordering::Relaxed) % self.outputs.len()
        };
        self.write_to(&self.outputs[index], msg).await;
    }

    async fn write_to(&self, output: &Arc<dyn PluginWriter>, msg: &Message) {
        match output.plugin_write(msg).await {
            Ok(_) => self.stats.incr_dispatched(),
            Err(e) => {
                self.stats.incr_write_errors();
                tracing::debug!(error = %e, "output write failed");
            }
        }
    }
}

/// Central coordinator: owns one copy task per input and fans traffic out to
/// the outputs, optionally through a middleware bridge.
pub struct Emitter {
    split_output: bool,
    recognize_tcp_sessions: bool,
    close_grace: Duration,
    report_stats: bool,
    stats: Arc<PipelineStats>,
    quit: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    plugins: Mutex<Option<Arc<InOutPlugins>>>,
}

impl Emitter {
    /// An emitter configured but not yet started.
    pub fn new(config: &PipelineConfig) -> Self {
        let (quit, _) = watch::channel(false);
        Emitter {
            split_output: config.split_output,
            recognize_tcp_sessions: config.recognize_tcp_sessions,
            close_grace: config.effective_close_grace(),
            report_stats: config.stats,
            stats: PipelineStats::new(),
            quit,
            tasks: Mutex::new(Vec::new()),
            plugins: Mutex::new(None),
        }
    }

    /// The counters this emitter maintains.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Spawns a copy task for every input. With a middleware installed,
    /// inputs feed the bridge and only its replies reach the router.
    pub fn start(&self, plugins: Arc<InOutPlugins>, middleware: Option<Middleware>) {
        let router = Arc::new(Router {
            outputs: plugins.outputs.clone(),
            split_output: self.split_output,
            recognize_tcp_sessions: self.recognize_tcp_sessions,
            round_robin: AtomicUsize::new(0),
            stats: Arc::clone(&self.stats),
        });

        let mut tasks = self.tasks.lock().expect("emitter task list poisoned");

        let sink = match middleware {
            None => Sink::Direct(router),
            Some(middleware) => {
                match middleware.start(Arc::clone(&router), self.quit.subscribe(), &mut tasks) {
                    Ok(feed) => Sink::Middleware(feed),
                    Err(e) => {
                        tracing::error!(error = %e, "middleware failed to start, routing directly");
                        Sink::Direct(router)
                    }
                }
            }
        };

        for input in &plugins.inputs {
            let input = Arc::clone(input);
            let sink = match &sink {
                Sink::Direct(router) => Sink::Direct(Arc::clone(router)),
                Sink::Middleware(feed) => Sink::Middleware(feed.clone()),
            };
            let stats = Arc::clone(&self.stats);
            let quit = self.quit.subscribe();
            tasks.push(tokio::spawn(copy_task(input, sink, stats, quit)));
        }

        if self.report_stats {
            let reporter = Arc::clone(&self.stats);
            tasks.push(reporter.spawn_reporter(STATS_INTERVAL, self.quit.subscribe()));
        }

        *self.plugins.lock().expect("emitter plugin slot poisoned") = Some(plugins);
        tracing::info!("emitter started");
    }

    /// Signals every task and plugin to stop, then waits up to the grace
    /// period for copy tasks to drain. Output queues past the deadline are
    /// abandoned.
    pub async fn close(&self) {
        let _ = self.quit.send(true);

        let plugins = self.plugins.lock().expect("emitter plugin slot poisoned").take();

        // inputs first, so pending reads resolve to Stopped
        if let Some(plugins) = &plugins {
            for plugin in &plugins.all {
                if plugin.writer().is_none() {
                    plugin.close().await;
                }
            }
        }

        // then let the copy tasks drain, bounded by the grace period
        let tasks: Vec<JoinHandle<()>> = {
            let mut guard = self.tasks.lock().expect("emitter task list poisoned");
            guard.drain(..).collect()
        };
        let deadline = Instant::now() + self.close_grace;
        for task in tasks {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, task).await.is_err() {
                tracing::warn!("copy task did not drain before the grace period");
            }
        }

        // finally the outputs; whatever they still queue past the grace
        // period is abandoned
        if let Some(plugins) = &plugins {
            plugins.close_all().await;
        }
        tracing::info!("emitter closed");
    }
}

async fn copy_task(
    input: Arc<dyn PluginReader>,
    sink: Sink,
    stats: Arc<PipelineStats>,
    mut quit: watch::Receiver<bool>,
) {
    loop {
        if *quit.borrow() {
            return;
        }
        tokio::select! {
            _ = quit.changed() => return,
            read = input.plugin_read() => match read {
                Ok(msg) => {
                    stats.incr_received();
                    match &sink {
                        Sink::Direct(router) => router.route(&msg).await,
                        Sink::Middleware(feed) => {
                            if feed.send(msg).await.is_err() {
                                tracing::warn!("middleware feed closed; input copy task exiting");
                                return;
                            }
                        }
                    }
                }
                Err(e) if e.kind == RecastErrorKind::Stopped => return,
                Err(e) if e.kind == RecastErrorKind::LimitExceeded => {
                    stats.incr_skipped();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "input read failed, backing off");
                    tokio::time::sleep(READ_RETRY_BACKOFF).await;
                }
            },
        }
    }
}
