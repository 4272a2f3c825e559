//! Store: process-wide facade and shared cache owner.
//!
//! The store is the only type application code touches. `subscribe` builds
//! an intent, routes it through the root for the reference's namespace
//! kind, and returns a stream that merges the intent's error signal with
//! the cached value at the reference's route once the intent is ready.

use crate::cache::SharedCache;
use crate::config::EngineConfig;
use crate::intent::{Intent, Readiness};
use crate::root::RootHandle;
use crate::shared::Shared;
use arbor_core::{
    BackingEffects, DiscoveryEffects, EngineError, FetchResult, Layer, Metadata, Reference,
    ReportEffects, Tag,
};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

enum StoreCmd {
    Subscribe(Arc<Intent>),
}

/// Process-wide facade over the attribute engine.
///
/// Cheap to clone; all clones share the same cache and root registry.
/// Must be constructed and used inside a tokio runtime.
#[derive(Clone)]
pub struct Store {
    tx: mpsc::UnboundedSender<StoreCmd>,
    shared: Arc<Shared>,
}

impl Store {
    /// Create a store with default configuration.
    pub fn new(
        discovery: Arc<dyn DiscoveryEffects>,
        backing: Arc<dyn BackingEffects>,
        reporter: Arc<dyn ReportEffects>,
    ) -> Self {
        Self::with_config(discovery, backing, reporter, EngineConfig::default())
    }

    /// Create a store with explicit configuration.
    pub fn with_config(
        discovery: Arc<dyn DiscoveryEffects>,
        backing: Arc<dyn BackingEffects>,
        reporter: Arc<dyn ReportEffects>,
        config: EngineConfig,
    ) -> Self {
        let shared = Arc::new(Shared {
            cache: SharedCache::new(config.cache_events.max(1)),
            discovery,
            backing,
            reporter,
            config,
        });
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = StoreActor {
            roots: HashMap::new(),
            shared: Arc::clone(&shared),
        };
        tokio::spawn(run(actor, rx));
        Self { tx, shared }
    }

    /// Subscribe to a reference.
    ///
    /// The stream yields the latest cached value for the reference once
    /// its data is available, every subsequent change, and any
    /// non-terminal errors the engine surfaces for this subscription. A
    /// malformed reference or a failed discovery yields a single terminal
    /// error result. Dropping the stream cancels the subscription; the
    /// live-count decrement is deferred past a yield so rapid
    /// resubscription does not tear shared state down.
    pub fn subscribe(
        &self,
        reference: Reference,
    ) -> impl Stream<Item = FetchResult> + Send + Unpin + 'static {
        let (tx, rx) = mpsc::channel(self.shared.config.subscription_buffer.max(1));
        match Intent::new(reference.clone(), self.shared.config.error_events) {
            Err(error) => {
                tracing::debug!(%reference, %error, "rejecting malformed subscription");
                let meta = Metadata::new(Layer::Store, reference);
                let _ = tx.try_send(FetchResult::error(error, meta));
            }
            Ok(intent) => {
                // take the signal receivers before routing so nothing is missed
                let errors = intent.errors();
                let readiness = intent.readiness();
                if self.tx.send(StoreCmd::Subscribe(Arc::clone(&intent))).is_err() {
                    intent.fail(Layer::Store, EngineError::internal("store actor is gone"));
                }
                let cache = self.shared.cache.clone();
                tokio::spawn(forward(intent, errors, readiness, cache, tx));
            }
        }
        ReceiverStream::new(rx)
    }

    /// Snapshot of the cached value at a reference's route, if any.
    pub async fn get(&self, reference: &Reference) -> Option<Value> {
        self.shared.cache.get(&reference.route()).await
    }
}

struct StoreActor {
    roots: HashMap<Tag, RootHandle>,
    shared: Arc<Shared>,
}

async fn run(mut actor: StoreActor, mut rx: mpsc::UnboundedReceiver<StoreCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCmd::Subscribe(intent) => actor.subscribe(intent),
        }
    }
}

impl StoreActor {
    fn subscribe(&mut self, intent: Arc<Intent>) {
        let root = match self.roots.get(&intent.kind) {
            Some(root) => root.clone(),
            None => {
                tracing::debug!(kind = %intent.kind, "creating root");
                let root = RootHandle::spawn(
                    intent.kind.clone(),
                    intent.root_reference.clone(),
                    Arc::clone(&self.shared),
                );
                self.roots.insert(intent.kind.clone(), root.clone());
                root
            }
        };
        if let Err(error) = root.handle(Arc::clone(&intent)) {
            self.shared.reporter.report(&error);
            intent.fail(Layer::Store, error);
        }
    }
}

enum Phase {
    Stream,
    Done,
}

/// Per-subscription forwarder: merges the intent's error signal with the
/// cache stream at the reference's route, switching to the latter once the
/// intent is ready.
async fn forward(
    intent: Arc<Intent>,
    mut errors: broadcast::Receiver<FetchResult>,
    mut readiness: watch::Receiver<Readiness>,
    cache: SharedCache,
    tx: mpsc::Sender<FetchResult>,
) {
    intent.retain();
    // phase one: forward errors while waiting for the intent's data
    let phase = loop {
        tokio::select! {
            result = errors.recv() => match result {
                Ok(item) => {
                    if tx.send(item).await.is_err() {
                        break Phase::Done;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break Phase::Done,
            },
            changed = readiness.changed() => {
                if changed.is_err() {
                    break Phase::Done;
                }
                let current = readiness.borrow_and_update().clone();
                match current {
                    Readiness::Pending => {}
                    Readiness::Ready => break Phase::Stream,
                    Readiness::Failed(result) => {
                        let _ = tx.send(result).await;
                        break Phase::Done;
                    }
                }
            },
            _ = tx.closed() => break Phase::Done,
        }
    };
    // phase two: stream the cached value at the reference's route
    if matches!(phase, Phase::Stream) {
        let mut values: BoxStream<'static, Value> = cache.watch(&intent.route).await;
        loop {
            tokio::select! {
                result = errors.recv() => match result {
                    Ok(item) => {
                        if tx.send(item).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                item = values.next() => match item {
                    Some(value) => {
                        let meta = Metadata::new(Layer::Store, intent.reference.clone());
                        if tx.send(FetchResult::value(value, meta)).await.is_err() {
                            break;
                        }
                    }
                    // the cache feed only ends when the store itself is gone
                    None => break,
                },
                _ = tx.closed() => break,
            }
        }
    }
    intent.release();
}
