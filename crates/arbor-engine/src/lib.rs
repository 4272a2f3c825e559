//! Arbor Engine - Reactive Remote-Attribute Resolution and Caching
//!
//! Application code subscribes by hierarchical name to externally-sourced
//! data and receives a live, deduplicated, policy-invalidated stream of
//! results. The engine discovers which backing implementation serves a
//! given name, multiplexes one backing subscription across any number of
//! consumers, and invalidates cached values on explicit triggers or
//! timers.
//!
//! # Architecture
//!
//! Every entity is a serialized execution context (a dedicated task fed by
//! a private inbox); distinct entities run fully concurrently:
//!
//! - [`Store`]: public facade, root registry, shared cache
//! - Root: discovery and top-level routing for one namespace kind
//! - Domain: routing and map ownership for one discovered tag
//! - Map: one backing subscription and its merge/invalidation logic
//!
//! Long-lived subscriptions run in their own tasks and feed results back
//! through the owning entity's inbox; restarting one always replaces it
//! wholesale.
//!
//! # Usage
//!
//! ```rust,no_run
//! use arbor_engine::{Store, Reference, Tag};
//! use futures::StreamExt;
//! # async fn example(discovery: std::sync::Arc<dyn arbor_engine::DiscoveryEffects>,
//! #                  backing: std::sync::Arc<dyn arbor_engine::BackingEffects>,
//! #                  reporter: std::sync::Arc<dyn arbor_engine::ReportEffects>) {
//! let store = Store::new(discovery, backing, reporter);
//! let reference = Reference::new(Tag::parse("api.assets.price").unwrap());
//! let mut results = store.subscribe(reference);
//! while let Some(result) = results.next().await {
//!     println!("{result:?}");
//! }
//! # }
//! ```

#![forbid(unsafe_code)]

mod cache;
mod config;
mod domain;
mod intent;
mod map;
mod root;
mod shared;
mod store;

pub use config::EngineConfig;
pub use store::Store;

// Re-export the data model and effect traits engine consumers need.
pub use arbor_core::{
    Backing, BackingEffects, Context, DiscoveryEffects, EngineError, FetchResult, Instance,
    InvalidationPolicy, Layer, Metadata, Reference, ReportEffects, Route, Tag,
};
