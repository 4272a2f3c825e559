//! Result envelopes for every value crossing an asynchronous boundary.

use crate::errors::EngineError;
use crate::reference::Reference;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The engine layer that produced a result, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Public facade and shared cache
    Store,
    /// Discovery and top-level routing
    Root,
    /// Per-tag routing and map ownership
    Domain,
    /// Backing subscription and invalidation
    Map,
    /// A backing implementation itself
    Source,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store => write!(f, "store"),
            Self::Root => write!(f, "root"),
            Self::Domain => write!(f, "domain"),
            Self::Map => write!(f, "map"),
            Self::Source => write!(f, "source"),
        }
    }
}

/// Provenance attached to every [`FetchResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Layer that produced the result
    pub layer: Layer,
    /// Reference the result pertains to
    pub reference: Reference,
}

impl Metadata {
    /// Metadata for `reference` produced at `layer`.
    pub fn new(layer: Layer, reference: Reference) -> Self {
        Self { layer, reference }
    }
}

/// Success or failure envelope for asynchronous engine outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchResult {
    /// A fetched value
    Value {
        /// The payload
        data: serde_json::Value,
        /// Provenance
        meta: Metadata,
    },
    /// A failure
    Error {
        /// The failure
        error: EngineError,
        /// Provenance
        meta: Metadata,
    },
}

impl FetchResult {
    /// Build a value result.
    pub fn value(data: serde_json::Value, meta: Metadata) -> Self {
        Self::Value { data, meta }
    }

    /// Build an error result.
    pub fn error(error: EngineError, meta: Metadata) -> Self {
        Self::Error { error, meta }
    }

    /// Whether this is a value result.
    pub fn is_value(&self) -> bool {
        matches!(self, Self::Value { .. })
    }

    /// The payload of a value result.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Value { data, .. } => Some(data),
            Self::Error { .. } => None,
        }
    }

    /// The failure of an error result.
    pub fn err(&self) -> Option<&EngineError> {
        match self {
            Self::Value { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }

    /// Provenance of the result.
    pub fn meta(&self) -> &Metadata {
        match self {
            Self::Value { meta, .. } | Self::Error { meta, .. } => meta,
        }
    }
}
