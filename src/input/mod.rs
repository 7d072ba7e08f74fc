/// Synthetic traffic source driven by tests.
pub mod test;

/// One synthetic request/response pair per second, for smoke runs.
pub mod dummy;

/// Plays back separator-framed recordings.
pub mod file;

/// Accepts separator-framed aggregator feeds over TCP.
pub mod tcp;

/// Captures live requests on an HTTP listener.
pub mod http;

/// Adapts an external capture listener's reassembled message stream.
pub mod raw;

pub use dummy::DummyInput;
pub use file::FileInput;
pub use http::HttpInput;
pub use raw::{CaptureDirection, CaptureMessage, RawInput};
pub use tcp::TcpInput;
pub use test::TestInput;
