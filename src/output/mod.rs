/// Concurrent HTTP replay with an elastic worker pool.
pub mod http;

/// Keep-alive TCP forwarding to an aggregator.
pub mod tcp;

/// Separator-framed recording to a file.
pub mod file;

/// Separator-framed frames on stdout, for debugging.
pub mod stdout;

/// Accepts and discards everything.
pub mod null;

/// Callback sink used by the test suite.
pub mod test;

pub use file::FileOutput;
pub use http::HttpOutput;
pub use null::NullOutput;
pub use stdout::StdoutOutput;
pub use tcp::TcpOutput;
pub use test::TestOutput;
