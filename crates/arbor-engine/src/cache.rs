//! Shared attribute cache.
//!
//! One JSON tree holds every fetched value, keyed by [`Route`]. Maps merge
//! values in concurrently; subscribers observe a route and receive the
//! value there after every overlapping change. Each write is atomic: the
//! read-modify-write of the tree happens under a single write lock, so two
//! merges into the same route never interleave.

use arbor_core::Route;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::RwLock;

/// Process-wide cache of fetched attribute values.
#[derive(Clone)]
pub(crate) struct SharedCache {
    inner: Arc<RwLock<Value>>,
    changed: broadcast::Sender<Route>,
}

impl SharedCache {
    /// Create an empty cache whose change feed buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (changed, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(RwLock::new(Value::Object(serde_json::Map::new()))),
            changed,
        }
    }

    /// Merge `incoming` into the tree at `route` and notify watchers.
    ///
    /// When both the existing and incoming values are objects they are
    /// deep-merged with incoming keys winning; otherwise incoming replaces
    /// the existing value outright.
    pub async fn merge(&self, route: &Route, incoming: Value) {
        {
            let mut root = self.inner.write().await;
            let slot = lookup_mut(&mut root, route.segments());
            let existing = slot.take();
            *slot = deep_merge(existing, incoming);
        }
        let _ = self.changed.send(route.clone());
    }

    /// Snapshot of the subtree at `route`.
    pub async fn get(&self, route: &Route) -> Option<Value> {
        let root = self.inner.read().await;
        let mut node = &*root;
        for segment in route.segments() {
            node = node.as_object()?.get(segment)?;
        }
        Some(node.clone())
    }

    /// Stream the value at `route`: the current value first (when present),
    /// then after every overlapping change. Consecutive duplicates are
    /// suppressed.
    pub async fn watch(&self, route: &Route) -> BoxStream<'static, Value> {
        self.stream(route, true).await
    }

    /// Like [`watch`](Self::watch) but without the initial emission; fires
    /// only on changes after subscription. Used for invalidation triggers.
    pub async fn changes(&self, route: &Route) -> BoxStream<'static, Value> {
        self.stream(route, false).await
    }

    async fn stream(&self, route: &Route, emit_initial: bool) -> BoxStream<'static, Value> {
        // Subscribe before the seed read so no change can slip between.
        let rx = self.changed.subscribe();
        let last = self.get(route).await;
        let initial = if emit_initial { last.clone() } else { None };
        let state = WatchState {
            cache: self.clone(),
            route: route.clone(),
            rx,
            last,
            initial,
        };
        stream::unfold(state, |mut state| async move {
            if let Some(value) = state.initial.take() {
                return Some((value, state));
            }
            loop {
                match state.rx.recv().await {
                    Ok(changed) if changed.overlaps(&state.route) => {
                        if let Some(value) = state.emit_if_changed().await {
                            return Some((value, state));
                        }
                    }
                    Ok(_) => {}
                    // Missed events; the snapshot read resynchronizes.
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if let Some(value) = state.emit_if_changed().await {
                            return Some((value, state));
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}

struct WatchState {
    cache: SharedCache,
    route: Route,
    rx: broadcast::Receiver<Route>,
    last: Option<Value>,
    initial: Option<Value>,
}

impl WatchState {
    async fn emit_if_changed(&mut self) -> Option<Value> {
        let current = self.cache.get(&self.route).await?;
        if self.last.as_ref() == Some(&current) {
            return None;
        }
        self.last = Some(current.clone());
        Some(current)
    }
}

/// Walk to the slot at `segments`, materializing intermediate objects.
fn lookup_mut<'a>(node: &'a mut Value, segments: &[String]) -> &'a mut Value {
    match segments.split_first() {
        None => node,
        Some((head, rest)) => {
            if !node.is_object() {
                *node = Value::Object(serde_json::Map::new());
            }
            if let Value::Object(map) = node {
                lookup_mut(map.entry(head.clone()).or_insert(Value::Null), rest)
            } else {
                // not reachable: the node was just made an object
                node
            }
        }
    }
}

fn deep_merge(existing: Value, incoming: Value) -> Value {
    match (existing, incoming) {
        (Value::Object(mut base), Value::Object(update)) => {
            for (key, value) in update {
                let merged = match base.remove(&key) {
                    Some(prior) => deep_merge(prior, value),
                    None => value,
                };
                base.insert(key, merged);
            }
            Value::Object(base)
        }
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route(path: &str) -> Route {
        Route::new(path.split('.').map(str::to_owned).collect())
    }

    #[tokio::test]
    async fn merge_combines_objects_with_incoming_keys_winning() {
        let cache = SharedCache::new(16);
        let r = route("api.assets");
        cache.merge(&r, json!({"a": 1, "b": {"x": 1}})).await;
        cache.merge(&r, json!({"b": {"y": 2}, "c": 3})).await;
        assert_eq!(
            cache.get(&r).await.unwrap(),
            json!({"a": 1, "b": {"x": 1, "y": 2}, "c": 3})
        );
    }

    #[tokio::test]
    async fn merge_is_idempotent_for_objects() {
        let cache = SharedCache::new(16);
        let r = route("api.assets");
        cache.merge(&r, json!({"a": 1})).await;
        let once = cache.get(&r).await;
        cache.merge(&r, json!({"a": 1})).await;
        assert_eq!(cache.get(&r).await, once);
    }

    #[tokio::test]
    async fn merge_replaces_non_object_values() {
        let cache = SharedCache::new(16);
        let r = route("api.count");
        cache.merge(&r, json!({"a": 1})).await;
        cache.merge(&r, json!(42)).await;
        assert_eq!(cache.get(&r).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn writing_below_a_scalar_replaces_it() {
        let cache = SharedCache::new(16);
        cache.merge(&route("api.node"), json!(1)).await;
        cache.merge(&route("api.node.child"), json!(2)).await;
        assert_eq!(cache.get(&route("api.node")).await.unwrap(), json!({"child": 2}));
    }

    #[tokio::test]
    async fn watch_emits_current_value_then_changes() {
        let cache = SharedCache::new(16);
        let r = route("api.assets");
        cache.merge(&r, json!({"a": 1})).await;
        let mut stream = cache.watch(&r).await;
        assert_eq!(stream.next().await.unwrap(), json!({"a": 1}));
        cache.merge(&r, json!({"a": 2})).await;
        assert_eq!(stream.next().await.unwrap(), json!({"a": 2}));
    }

    #[tokio::test]
    async fn watch_suppresses_duplicate_values() {
        let cache = SharedCache::new(16);
        let r = route("api.assets");
        cache.merge(&r, json!({"a": 1})).await;
        let mut stream = cache.watch(&r).await;
        assert_eq!(stream.next().await.unwrap(), json!({"a": 1}));
        // same value again, then a real change
        cache.merge(&r, json!({"a": 1})).await;
        cache.merge(&r, json!({"a": 2})).await;
        assert_eq!(stream.next().await.unwrap(), json!({"a": 2}));
    }

    #[tokio::test]
    async fn watch_sees_ancestor_writes() {
        let cache = SharedCache::new(16);
        let mut stream = cache.watch(&route("api.assets.price")).await;
        cache.merge(&route("api.assets"), json!({"price": 9})).await;
        assert_eq!(stream.next().await.unwrap(), json!(9));
    }

    #[tokio::test]
    async fn changes_has_no_initial_emission() {
        let cache = SharedCache::new(16);
        let r = route("api.flags");
        cache.merge(&r, json!(true)).await;
        let mut stream = cache.changes(&r).await;
        cache.merge(&r, json!(false)).await;
        assert_eq!(stream.next().await.unwrap(), json!(false));
    }
}
