//! Arbor Core - Attribute Engine Foundation
//!
//! This crate provides the data model and effect interfaces for the arbor
//! remote-attribute engine. It contains only pure types and trait
//! signatures with no engine logic or transport code.
//!
//! # Contents
//!
//! - Hierarchical naming: [`Tag`], [`Context`], [`Reference`], [`Route`]
//! - Result envelopes: [`FetchResult`], [`Metadata`], [`Layer`]
//! - Value envelopes: [`Instance`], [`InvalidationPolicy`]
//! - Unified error handling: [`EngineError`]
//! - Effect interfaces: [`DiscoveryEffects`], [`BackingEffects`],
//!   [`ReportEffects`]
//!
//! Engine code is parameterized by the effect traits, so production
//! transports and in-memory test handlers are interchangeable.

#![forbid(unsafe_code)]

/// Hierarchical tag namespace
pub mod tag;

/// Tag-keyed index contexts
pub mod context;

/// Addressable references and cache routes
pub mod reference;

/// Result envelopes crossing asynchronous boundaries
pub mod result;

/// Value instances and invalidation policies
pub mod policy;

/// Unified error handling
pub mod errors;

/// Pure effect interfaces (no implementations)
pub mod effects;

pub use context::Context;
pub use effects::{
    Backing, BackingEffects, BackingStream, ComputeFuture, DiscoveryEffects, InstanceStream,
    ReportEffects, ValueStream,
};
pub use errors::EngineError;
pub use policy::{Instance, InvalidationPolicy};
pub use reference::{Reference, Route};
pub use result::{FetchResult, Layer, Metadata};
pub use tag::Tag;
