//! In-memory backing-value source for testing.

use arbor_core::{Backing, BackingEffects, BackingStream, EngineError, Instance, Reference};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type BackingFactory = Arc<dyn Fn() -> Backing + Send + Sync>;

#[derive(Default)]
struct SourceEntry {
    latest: Option<BackingFactory>,
    subscribers: Vec<mpsc::UnboundedSender<Result<Backing, EngineError>>>,
    resolve_count: usize,
}

/// Programmable backing source.
///
/// Tests supply backing shapes per source reference. Active subscriptions
/// receive them live; a subscription opened after a supply replays the
/// most recent shape. Because [`Backing`] is consumed on delivery, shapes
/// are registered as factories and re-materialized per delivery.
#[derive(Clone, Default)]
pub struct MemoryBacking {
    inner: Arc<Mutex<HashMap<String, SourceEntry>>>,
}

impl MemoryBacking {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Supply a single-value backing for `source`.
    pub fn supply_value(&self, source: &Reference, instance: Instance) {
        self.supply(source, move || Backing::Value(instance.clone()));
    }

    /// Supply an arbitrary backing shape for `source`.
    pub fn supply(
        &self,
        source: &Reference,
        factory: impl Fn() -> Backing + Send + Sync + 'static,
    ) {
        let factory: BackingFactory = Arc::new(factory);
        let mut inner = self.lock();
        let entry = inner.entry(source.route().to_string()).or_default();
        entry.latest = Some(Arc::clone(&factory));
        entry.subscribers.retain(|tx| tx.send(Ok(factory())).is_ok());
    }

    /// Push a transient failure to every active subscription of `source`.
    /// Failures are not replayed to later subscribers.
    pub fn supply_error(&self, source: &Reference, error: EngineError) {
        let mut inner = self.lock();
        let entry = inner.entry(source.route().to_string()).or_default();
        entry
            .subscribers
            .retain(|tx| tx.send(Err(error.clone())).is_ok());
    }

    /// How many times `source` has been resolved in total.
    pub fn resolve_count(&self, source: &Reference) -> usize {
        self.lock()
            .get(&source.route().to_string())
            .map_or(0, |entry| entry.resolve_count)
    }

    /// How many subscriptions to `source` are currently alive.
    pub fn active_subscriptions(&self, source: &Reference) -> usize {
        let mut inner = self.lock();
        let Some(entry) = inner.get_mut(&source.route().to_string()) else {
            return 0;
        };
        entry.subscribers.retain(|tx| !tx.is_closed());
        entry.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SourceEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BackingEffects for MemoryBacking {
    async fn resolve(&self, source: &Reference) -> BackingStream {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.lock();
            let entry = inner.entry(source.route().to_string()).or_default();
            entry.resolve_count += 1;
            if let Some(factory) = &entry.latest {
                let _ = tx.send(Ok(factory()));
            }
            entry.subscribers.push(tx);
        }
        UnboundedReceiverStream::new(rx).boxed()
    }
}
