use crate::error::{RecastError, RecastErrorKind};
use crate::plugin::{Plugin, PluginReader, PluginWriter};
use crate::protocol::Message;
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

enum LimiterMode {
    /// Messages per wall-clock second.
    Absolute {
        limit: u64,
        started: Instant,
        window: AtomicU64,
        count: AtomicU64,
    },
    /// Admission probability, 0–100.
    Percent(u8),
}

/// Uniform admission-control wrapper over any reader or writer.
///
/// Built from the `|<rate>` suffix of a plugin option: a bare integer is an
/// absolute per-second budget, an integer with a trailing `%` a sampling
/// rate. A refused write silently reports zero bytes; a refused read
/// surfaces `LimitExceeded` so the emitter can skip the message.
pub struct Limiter {
    plugin: Plugin,
    reader: Option<std::sync::Arc<dyn PluginReader>>,
    writer: Option<std::sync::Arc<dyn PluginWriter>>,
    mode: LimiterMode,
}

impl Limiter {
    /// Wraps `plugin` with the admission rule in `spec`.
    pub fn new(plugin: Plugin, spec: &str) -> Result<Self, RecastError> {
        let spec = spec.trim();
        let mode = if let Some(percent) = spec.strip_suffix('%') {
            let percent: u8 = percent.parse().map_err(|_| bad_spec(spec))?;
            if percent > 100 {
                return Err(bad_spec(spec));
            }
            LimiterMode::Percent(percent)
        } else {
            let limit: u64 = spec.parse().map_err(|_| bad_spec(spec))?;
            LimiterMode::Absolute {
                limit,
                started: Instant::now(),
                window: AtomicU64::new(0),
                count: AtomicU64::new(0),
            }
        };
        let reader = plugin.reader();
        let writer = plugin.writer();
        Ok(Limiter {
            plugin,
            reader,
            writer,
            mode,
        })
    }

    /// The wrapped plugin, so tests can reach the inner object.
    pub fn plugin(&self) -> &Plugin {
        &self.plugin
    }

    /// True when the wrapped plugin can read.
    pub fn has_reader(&self) -> bool {
        self.reader.is_some()
    }

    /// True when the wrapped plugin can write.
    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    fn allow(&self) -> bool {
        match &self.mode {
            LimiterMode::Percent(percent) => {
                rand::thread_rng().gen_range(0..100u32) < u32::from(*percent)
            }
            LimiterMode::Absolute {
                limit,
                started,
                window,
                count,
            } => {
                let second = started.elapsed().as_secs();
                let seen = window.load(Ordering::Acquire);
                // one winner resets the window; a slight overshoot while
                // racing is acceptable
                if second != seen
                    && window
                        .compare_exchange(seen, second, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    count.store(0, Ordering::Release);
                }
                count.fetch_add(1, Ordering::AcqRel) < *limit
            }
        }
    }
}

fn bad_spec(spec: &str) -> RecastError {
    RecastError::new(
        RecastErrorKind::Constructor,
        format!("bad limiter spec: {:?}", spec),
    )
}

#[async_trait]
impl PluginReader for Limiter {
    async fn plugin_read(&self) -> Result<Message, RecastError> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| RecastError::new(RecastErrorKind::Constructor, "not a reader"))?;
        let msg = reader.plugin_read().await?;
        if self.allow() {
            Ok(msg)
        } else {
            Err(RecastError::new(
                RecastErrorKind::LimitExceeded,
                "input over admission budget",
            ))
        }
    }
}

#[async_trait]
impl PluginWriter for Limiter {
    async fn plugin_write(&self, msg: &Message) -> Result<usize, RecastError> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| RecastError::new(RecastErrorKind::Constructor, "not a writer"))?;
        if !self.allow() {
            return Ok(0);
        }
        writer.plugin_write(msg).await
    }
}
