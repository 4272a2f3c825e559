//! Engine context shared down the actor hierarchy.

use crate::cache::SharedCache;
use crate::config::EngineConfig;
use arbor_core::{BackingEffects, DiscoveryEffects, ReportEffects};
use std::sync::Arc;

/// Cache, effect handlers and configuration every actor needs.
pub(crate) struct Shared {
    pub cache: SharedCache,
    pub discovery: Arc<dyn DiscoveryEffects>,
    pub backing: Arc<dyn BackingEffects>,
    pub reporter: Arc<dyn ReportEffects>,
    pub config: EngineConfig,
}
