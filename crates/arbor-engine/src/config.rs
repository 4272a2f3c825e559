//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunable capacities for the engine's internal channels.
///
/// The defaults are sized for a typical application process; none of the
/// values affect the engine's semantics, only how much buffering sits
/// between producers and slow consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the cache change broadcast channel.
    pub cache_events: usize,
    /// Per-subscriber buffer between the engine and a consumer stream.
    pub subscription_buffer: usize,
    /// Capacity of each intent's error broadcast channel.
    pub error_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_events: 256,
            subscription_buffer: 64,
            error_events: 16,
        }
    }
}
