//! Unified error handling for the attribute engine.
//!
//! A single error enum covers every failure the engine can surface. Errors
//! are cloneable and serializable so they can cross broadcast channels and
//! ride inside result envelopes.

use serde::{Deserialize, Serialize};

/// Unified error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum EngineError {
    /// A reference that cannot be subscribed to (no namespace kind).
    #[error("Malformed reference: {message}")]
    Malformed {
        /// Description of the malformed input
        message: String,
    },

    /// Namespace discovery failed for a whole kind.
    #[error("Discovery failed: {message}")]
    Discovery {
        /// Description of the discovery failure
        message: String,
    },

    /// No discovered domain serves a target tag.
    #[error("Routing failed: {message}")]
    Routing {
        /// Description of the routing failure
        message: String,
    },

    /// A backing implementation reported a failure.
    #[error("Source error: {message}")]
    Source {
        /// Description of the source failure
        message: String,
    },

    /// A payload could not be decoded into the expected shape.
    #[error("Decode error: {message}")]
    Decode {
        /// Description of the decode failure
        message: String,
    },

    /// Internal engine error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

impl EngineError {
    /// Create a malformed-reference error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Create a discovery error.
    pub fn discovery(message: impl Into<String>) -> Self {
        Self::Discovery {
            message: message.into(),
        }
    }

    /// Create a routing error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing {
            message: message.into(),
        }
    }

    /// Create a source error.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
