use crate::config::PipelineConfig;
use crate::error::RecastError;
use crate::input::{DummyInput, FileInput, HttpInput, RawInput, TcpInput, TestInput};
use crate::limiter::Limiter;
use crate::modifier::HttpModifier;
use crate::output::{FileOutput, HttpOutput, NullOutput, StdoutOutput, TcpOutput, TestOutput};
use crate::protocol::Message;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Input side of a plugin: a source of messages.
#[async_trait]
pub trait PluginReader: Send + Sync {
    /// Blocks until the next message, `Stopped` on shutdown, or
    /// `LimitExceeded` when an admission gate refused one.
    async fn plugin_read(&self) -> Result<Message, RecastError>;
}

/// Output side of a plugin: a sink for messages.
#[async_trait]
pub trait PluginWriter: Send + Sync {
    /// Accepts one message, returning the bytes taken. Sinks that enqueue
    /// internally report acceptance, not delivery.
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError>;
}

/// Every plugin the registry can construct, with its capabilities declared
/// by the variant itself rather than probed at runtime.
pub enum Plugin {
    /// Synthetic pair-per-second input.
    DummyInput(Arc<DummyInput>),
    /// Scriptable test input.
    TestInput(Arc<TestInput>),
    /// Recorded-file playback.
    FileInput(Arc<FileInput>),
    /// Separator-framed TCP feed.
    TcpInput(Arc<TcpInput>),
    /// Live HTTP capture listener.
    HttpInput(Arc<HttpInput>),
    /// Capture-engine adapter.
    RawInput(Arc<RawInput>),
    /// Frames to stdout.
    StdoutOutput(Arc<StdoutOutput>),
    /// Discards everything.
    NullOutput(Arc<NullOutput>),
    /// Callback sink for tests.
    TestOutput(Arc<TestOutput>),
    /// Separator-framed recording.
    FileOutput(Arc<FileOutput>),
    /// Keep-alive aggregator forwarding.
    TcpOutput(Arc<TcpOutput>),
    /// HTTP replay pool; also a reader when it tracks responses.
    HttpOutput(Arc<HttpOutput>),
    /// Rate-limit wrapper around any of the above.
    Limiter(Arc<Limiter>),
}

impl Plugin {
    /// The reader capability, if this plugin has one.
    pub fn reader(&self) -> Option<Arc<dyn PluginReader>> {
        match self {
            Plugin::DummyInput(p) => Some(p.clone()),
            Plugin::TestInput(p) => Some(p.clone()),
            Plugin::FileInput(p) => Some(p.clone()),
            Plugin::TcpInput(p) => Some(p.clone()),
            Plugin::HttpInput(p) => Some(p.clone()),
            Plugin::RawInput(p) => Some(p.clone()),
            Plugin::HttpOutput(p) if p.track_responses() => Some(p.clone()),
            Plugin::Limiter(p) if p.has_reader() => Some(p.clone()),
            _ => None,
        }
    }

    /// The writer capability, if this plugin has one.
    pub fn writer(&self) -> Option<Arc<dyn PluginWriter>> {
        match self {
            Plugin::StdoutOutput(p) => Some(p.clone()),
            Plugin::NullOutput(p) => Some(p.clone()),
            Plugin::TestOutput(p) => Some(p.clone()),
            Plugin::FileOutput(p) => Some(p.clone()),
            Plugin::TcpOutput(p) => Some(p.clone()),
            Plugin::HttpOutput(p) => Some(p.clone()),
            Plugin::Limiter(p) if p.has_writer() => Some(p.clone()),
            _ => None,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::DummyInput(_) => "dummy input",
            Plugin::TestInput(_) => "test input",
            Plugin::FileInput(_) => "file input",
            Plugin::TcpInput(_) => "tcp input",
            Plugin::HttpInput(_) => "http input",
            Plugin::RawInput(_) => "raw input",
            Plugin::StdoutOutput(_) => "stdout output",
            Plugin::NullOutput(_) => "null output",
            Plugin::TestOutput(_) => "test output",
            Plugin::FileOutput(_) => "file output",
            Plugin::TcpOutput(_) => "tcp output",
            Plugin::HttpOutput(_) => "http output",
            Plugin::Limiter(_) => "limiter",
        }
    }

    /// Signals the plugin to stop. Boxed because a limiter closes what it
    /// wraps.
    pub fn close(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            match self {
                Plugin::DummyInput(p) => p.close(),
                Plugin::TestInput(p) => p.close(),
                Plugin::FileInput(p) => p.close(),
                Plugin::TcpInput(p) => p.close(),
                Plugin::HttpInput(p) => p.close(),
                Plugin::RawInput(p) => p.close(),
                Plugin::StdoutOutput(_) | Plugin::NullOutput(_) | Plugin::TestOutput(_) => {}
                Plugin::FileOutput(_) => {}
                Plugin::TcpOutput(p) => p.close(),
                Plugin::HttpOutput(p) => p.close(),
                Plugin::Limiter(p) => p.plugin().close().await,
            }
        })
    }
}

/// The constructed plugin set: ordered readers, ordered writers, and the
/// flat list used for lifecycle. Written once at startup, read-only after.
#[derive(Default)]
pub struct InOutPlugins {
    /// Inputs in registration order.
    pub inputs: Vec<Arc<dyn PluginReader>>,
    /// Outputs in registration order.
    pub outputs: Vec<Arc<dyn PluginWriter>>,
    /// Every constructed plugin, for shutdown.
    pub all: Vec<Plugin>,
}

impl InOutPlugins {
    /// An empty set; tests compose their own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a plugin, optionally wrapped in a limiter, into whichever
    /// lists its capabilities call for.
    pub fn register(&mut self, plugin: Plugin, limit: Option<&str>) -> Result<(), RecastError> {
        let plugin = match limit {
            Some(spec) if !spec.is_empty() => {
                Plugin::Limiter(Arc::new(Limiter::new(plugin, spec)?))
            }
            _ => plugin,
        };
        if let Some(reader) = plugin.reader() {
            self.inputs.push(reader);
        }
        if let Some(writer) = plugin.writer() {
            self.outputs.push(writer);
        }
        self.all.push(plugin);
        Ok(())
    }

    /// Signals every plugin to stop.
    pub async fn close_all(&self) {
        futures::future::join_all(self.all.iter().map(|plugin| plugin.close())).await;
    }
}

/// Splits a plugin option on its first `|`: the prefix is the plugin's own
/// argument, the suffix (when present) a limiter spec.
pub fn extract_limit_options(options: &str) -> (&str, Option<&str>) {
    match options.split_once('|') {
        Some((address, limit)) if !limit.is_empty() => (address, Some(limit)),
        Some((address, _)) => (address, None),
        None => (options, None),
    }
}

/// Constructs every plugin the configuration names, in a fixed order.
///
/// Any constructor failure aborts the whole build; the pipeline refuses to
/// start partially.
pub async fn new_plugins(config: &PipelineConfig) -> Result<InOutPlugins, RecastError> {
    let mut plugins = InOutPlugins::new();

    for options in &config.input_dummy {
        let (_, limit) = extract_limit_options(options);
        plugins.register(Plugin::DummyInput(DummyInput::new()), limit)?;
    }

    for options in &config.input_file {
        let (path, limit) = extract_limit_options(options);
        let input = FileInput::new(path, config.input_file_loop).await?;
        plugins.register(Plugin::FileInput(input), limit)?;
    }

    for options in &config.input_tcp {
        let (address, limit) = extract_limit_options(options);
        plugins.register(Plugin::TcpInput(TcpInput::new(address).await?), limit)?;
    }

    for options in &config.input_http {
        let (address, limit) = extract_limit_options(options);
        plugins.register(Plugin::HttpInput(HttpInput::new(address).await?), limit)?;
    }

    if config.output_stdout {
        plugins.register(Plugin::StdoutOutput(StdoutOutput::new()), None)?;
    }

    if config.output_null {
        plugins.register(Plugin::NullOutput(NullOutput::new()), None)?;
    }

    for options in &config.output_tcp {
        let (address, limit) = extract_limit_options(options);
        let output = TcpOutput::new(address, config.output_tcp_config.clone())?;
        plugins.register(Plugin::TcpOutput(output), limit)?;
    }

    for options in &config.output_file {
        let (path, limit) = extract_limit_options(options);
        plugins.register(Plugin::FileOutput(FileOutput::new(path).await?), limit)?;
    }

    let modifier = HttpModifier::new(&config.modifier)?.map(Arc::new);
    let mut http_config = config.output_http_config.clone();
    // an explicitly rewritten Host header must survive the client's own
    // host derivation
    if modifier.as_ref().is_some_and(|m| m.sets_host()) {
        http_config.original_host = true;
    }

    for options in &config.output_http {
        let (address, limit) = extract_limit_options(options);
        let output = HttpOutput::new(address, http_config.clone(), modifier.clone())?;
        plugins.register(Plugin::HttpOutput(output), limit)?;
    }

    tracing::info!(
        inputs = plugins.inputs.len(),
        outputs = plugins.outputs.len(),
        "plugin registry ready"
    );
    Ok(plugins)
}
