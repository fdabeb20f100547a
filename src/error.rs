//! Error types for tracing sessions and spectrum queries

use thiserror::Error;

/// Errors surfaced by the tracer and the spectrum engine
#[derive(Error, Debug)]
pub enum TraceError {
    /// A session ended without observing a single qualifying call
    #[error("No call collected")]
    NoCallCollected,

    /// The block failed with an error before any qualifying call
    #[error("No call collected; block failed with: {0}")]
    FaultWithoutCall(String),

    /// A session was driven through an invalid state transition
    #[error("Invalid session transition: {from} -> {to}")]
    SessionState {
        from: &'static str,
        to: &'static str,
    },

    #[error("Invalid ignore pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid ignore expression: {0}. Expected format: ignore=SPEC")]
    InvalidExpression(String),

    #[error("Unknown outcome '{0}' (expected PASS or FAIL)")]
    UnknownOutcome(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tracer operations
pub type Result<T> = std::result::Result<T, TraceError>;
