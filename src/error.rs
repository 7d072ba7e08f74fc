use std::fmt::Display;

/// Classifies every failure the pipeline can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecastErrorKind {
    /// Clean shutdown; inputs return this once their cancellation fires.
    Stopped,
    /// A meta line that could not be parsed.
    MalformedMeta,
    /// An input-side limiter refused the message; the emitter skips it.
    LimitExceeded,
    /// The HTTP output's request queue rejected the message at ingress.
    QueueFull,
    /// Network-level failure while replaying or forwarding.
    Transport,
    /// The capture layer flagged the message as cut short. Not fatal.
    Truncated,
    /// A plugin constructor failed; startup aborts.
    Constructor,
}

impl Display for RecastErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecastErrorKind::Stopped => write!(f, "stopped"),
            RecastErrorKind::MalformedMeta => write!(f, "malformed meta"),
            RecastErrorKind::LimitExceeded => write!(f, "limit exceeded"),
            RecastErrorKind::QueueFull => write!(f, "queue full"),
            RecastErrorKind::Transport => write!(f, "transport error"),
            RecastErrorKind::Truncated => write!(f, "truncated payload"),
            RecastErrorKind::Constructor => write!(f, "constructor failure"),
        }
    }
}

/// Error type carried across the pipeline.
#[derive(Debug)]
pub struct RecastError {
    /// What class of failure this is.
    pub kind: RecastErrorKind,
    /// Human-readable context.
    pub message: String,
}

impl RecastError {
    /// Builds an error of the given kind with context.
    pub fn new(kind: RecastErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for the clean-shutdown signal.
    pub fn stopped() -> Self {
        Self::new(RecastErrorKind::Stopped, "plugin closed")
    }

    /// True when this error only signals clean shutdown.
    pub fn is_stopped(&self) -> bool {
        self.kind == RecastErrorKind::Stopped
    }
}

impl Display for RecastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RecastError: {{ message: {}, kind: {} }}",
            self.message, self.kind
        )
    }
}

impl std::error::Error for RecastError {}

impl From<std::io::Error> for RecastError {
    fn from(err: std::io::Error) -> Self {
        Self {
            kind: RecastErrorKind::Transport,
            message: err.to_string(),
        }
    }
}

impl From<std::num::ParseIntError> for RecastError {
    fn from(err: std::num::ParseIntError) -> Self {
        Self {
            kind: RecastErrorKind::MalformedMeta,
            message: err.to_string(),
        }
    }
}

impl From<hex::FromHexError> for RecastError {
    fn from(err: hex::FromHexError) -> Self {
        Self {
            kind: RecastErrorKind::MalformedMeta,
            message: err.to_string(),
        }
    }
}

impl From<url::ParseError> for RecastError {
    fn from(err: url::ParseError) -> Self {
        Self {
            kind: RecastErrorKind::Constructor,
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for RecastError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            kind: RecastErrorKind::Transport,
            message: err.to_string(),
        }
    }
}

impl From<regex::Error> for RecastError {
    fn from(err: regex::Error) -> Self {
        Self {
            kind: RecastErrorKind::Constructor,
            message: err.to_string(),
        }
    }
}
