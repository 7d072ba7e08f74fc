#![warn(missing_docs)]

//! # Recast
//!
//! Recast is a traffic-capture-and-replay engine for HTTP and raw TCP
//! workloads. It reads production traffic from one or more inputs, carries
//! it through a fan-in/fan-out pipeline, and delivers copies to one or more
//! sinks: a replay HTTP endpoint, a file, a TCP aggregator, or stdout.
//!
//! ## Modules
//!
//! - [`protocol`] - The message envelope, meta-line codec, and wire framing.
//! - [`plugin`] - Reader/writer contracts and the registry that builds the
//!   plugin set from configuration.
//! - [`emitter`] - The pipeline coordinator: copy tasks, routing policy, and
//!   the middleware splice.
//! - [`limiter`] - Absolute and percentage admission control around any
//!   plugin.
//! - [`input`] / [`output`] - The concrete traffic sources and sinks.
//! - [`modifier`] - The request rewrite hook applied before HTTP replay.
//! - [`middleware`] - The external transformation bridge over stdio.
//! - [`config`] - The immutable pipeline configuration.
//! - [`stats`] - Pipeline counters and latency sampling.

/// The message envelope, meta-line codec, separator framing, and session
/// hashing.
pub mod protocol;

/// Helpers for parsing and rewriting raw HTTP/1.1 payload bytes.
pub mod proto;

/// Immutable configuration passed to the registry and the emitter.
pub mod config;

/// Reader/writer contracts, the plugin sum type, and the registry builder.
pub mod plugin;

/// Admission-control wrapper for readers and writers.
pub mod limiter;

/// The pipeline coordinator.
pub mod emitter;

/// External transformation stage between inputs and routing.
pub mod middleware;

/// Request rewrite rules applied by the HTTP output.
pub mod modifier;

/// Traffic sources.
pub mod input;

/// Traffic sinks.
pub mod output;

/// Pipeline counters and latency sampling.
pub mod stats;

/// Error types shared across the pipeline.
///
/// Every plugin read or write resolves to a [`error::RecastError`] whose
/// [`error::RecastErrorKind`] distinguishes clean shutdown from genuine
/// failures.
pub mod error;

#[cfg(test)]
mod tests;
