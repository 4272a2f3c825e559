//! In-memory discovery transport for testing.

use arbor_core::{DiscoveryEffects, EngineError, Reference, ValueStream};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

struct Feed {
    tx: broadcast::Sender<Result<Value, EngineError>>,
    latest: Option<Result<Value, EngineError>>,
}

impl Feed {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(32);
        Self { tx, latest: None }
    }
}

/// Programmable discovery transport.
///
/// Tests announce domain sets (or failures) per root reference; active
/// discovery streams receive them live and late subscribers replay the
/// most recent item.
#[derive(Clone, Default)]
pub struct MemoryDiscovery {
    inner: Arc<Mutex<HashMap<String, Feed>>>,
}

impl MemoryDiscovery {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Announce the set of child-domain keys under `root`.
    pub fn announce(&self, root: &Reference, keys: &[&str]) {
        let mut payload = serde_json::Map::new();
        for key in keys {
            payload.insert((*key).to_owned(), Value::Object(serde_json::Map::new()));
        }
        self.publish(root, Ok(Value::Object(payload)));
    }

    /// Deliver a discovery failure for `root`.
    pub fn fail(&self, root: &Reference, error: EngineError) {
        self.publish(root, Err(error));
    }

    /// Deliver a raw discovery payload for `root`.
    pub fn publish(&self, root: &Reference, item: Result<Value, EngineError>) {
        let mut inner = self.lock();
        let feed = inner
            .entry(root.route().to_string())
            .or_insert_with(Feed::new);
        feed.latest = Some(item.clone());
        let _ = feed.tx.send(item);
    }

    /// End every active discovery stream for `root`, keeping the latest
    /// item for future subscribers.
    pub fn close(&self, root: &Reference) {
        let mut inner = self.lock();
        if let Some(feed) = inner.get_mut(&root.route().to_string()) {
            let latest = feed.latest.take();
            *feed = Feed::new();
            feed.latest = latest;
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Feed>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DiscoveryEffects for MemoryDiscovery {
    async fn discover(&self, root: &Reference) -> ValueStream {
        let (initial, rx) = {
            let mut inner = self.lock();
            let feed = inner
                .entry(root.route().to_string())
                .or_insert_with(Feed::new);
            (feed.latest.clone(), feed.tx.subscribe())
        };
        let live = BroadcastStream::new(rx).filter_map(|item| async move { item.ok() });
        stream::iter(initial).chain(live).boxed()
    }
}
