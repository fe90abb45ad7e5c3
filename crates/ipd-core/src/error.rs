//! Error types for the experiment engine.

use thiserror::Error;

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A config document failed to parse or deserialize.
    #[error("config error: {0}")]
    Config(String),

    /// An `AgentRef` named a `type` the registry does not recognize.
    #[error("unknown agent type: {0}")]
    UnknownAgentType(String),

    /// A policy agent config named a policy the registry does not recognize.
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    /// A horizon config named a `type` the engine does not recognize.
    #[error("unknown horizon type: {0}")]
    UnknownHorizonType(String),

    /// The completion adapter returned an error.
    #[error("completion request failed: {0}")]
    Completion(String),

    /// An agent reference could not be resolved within a registry.
    #[error("agent error: {0}")]
    Agent(String),

    /// An artifact (event log, manifest, aggregates) could not be written or read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Aggregation failed while scanning the event log at the given byte offset.
    #[error("aggregation failed at offset {offset}: {reason}")]
    Aggregation {
        /// Byte offset into the event log where aggregation failed.
        offset: u64,
        /// Human-readable reason.
        reason: String,
    },
}

/// Convenience alias for engine operations.
pub type Result<T> = std::result::Result<T, CoreError>;
