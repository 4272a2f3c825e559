//! Pure effect interfaces for the engine's outbound collaborators.
//!
//! The engine talks to three collaborators: a discovery transport telling
//! it which domains exist under a namespace kind, backing implementations
//! supplying values, and an error sink for failures that never reach a
//! subscriber. All three are trait objects injected at store construction,
//! so production transports and in-memory test handlers are
//! interchangeable.

use crate::errors::EngineError;
use crate::policy::Instance;
use crate::reference::Reference;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::fmt;

/// Stream of raw discovery payloads for one root reference.
pub type ValueStream = BoxStream<'static, Result<serde_json::Value, EngineError>>;

/// Stream of backing shapes for one source reference.
pub type BackingStream = BoxStream<'static, Result<Backing, EngineError>>;

/// Push stream of instances keyed to one destination.
pub type InstanceStream = BoxStream<'static, Instance>;

/// One-shot computation of an instance for one destination.
pub type ComputeFuture = BoxFuture<'static, Result<Instance, EngineError>>;

/// The three shapes a resolved backing implementation normalizes to.
pub enum Backing {
    /// A single value for the destination, emitted once.
    Value(Instance),
    /// A push stream of values keyed by destination, each emitted in order.
    Stream(Box<dyn FnOnce(Reference) -> InstanceStream + Send>),
    /// A one-shot function of the destination, its result emitted once.
    Compute(Box<dyn FnOnce(Reference) -> ComputeFuture + Send>),
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(instance) => f.debug_tuple("Value").field(instance).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Discovery transport: which domains exist under a namespace kind.
///
/// Each stream item is expected to decode as a JSON object whose keys are
/// child-domain paths relative to the root's kind tag.
#[async_trait]
pub trait DiscoveryEffects: Send + Sync {
    /// Subscribe to the domain set published for `root`.
    async fn discover(&self, root: &Reference) -> ValueStream;
}

/// Backing-value transport: resolve the implementation serving a source.
#[async_trait]
pub trait BackingEffects: Send + Sync {
    /// Subscribe to the backing shapes published for `source`.
    async fn resolve(&self, source: &Reference) -> BackingStream;
}

/// Global error sink for failures that never reach a subscriber.
pub trait ReportEffects: Send + Sync {
    /// Report an error. Fire-and-forget; must never fail.
    fn report(&self, error: &EngineError);
}
