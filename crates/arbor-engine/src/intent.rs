//! Outstanding subscription requests.
//!
//! An [`Intent`] tracks one external subscription attempt: readiness (a
//! one-shot signal that fires the first time data is available, or fails
//! terminally), a multicast of non-terminal errors, and a live-subscriber
//! count. The engine holds intents only transiently in pending lists while
//! routing; the subscriber's forwarder task is the authoritative owner.

use arbor_core::{Context, EngineError, FetchResult, Layer, Metadata, Reference, Route, Tag};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

/// One-shot readiness state of an intent.
#[derive(Debug, Clone)]
pub(crate) enum Readiness {
    /// No data available yet
    Pending,
    /// A value for the reference reached the cache
    Ready,
    /// Terminal failure; the enclosed result is the last the subscriber sees
    Failed(FetchResult),
}

/// One outstanding subscription request for one reference.
pub(crate) struct Intent {
    /// Unique id of this subscription attempt.
    pub id: Uuid,
    /// The reference the consumer subscribed to.
    pub reference: Reference,
    /// The namespace kind serving the reference.
    pub kind: Tag,
    /// The reference the owning root discovers against.
    pub root_reference: Reference,
    /// Cache route of the target reference.
    pub route: Route,
    readiness_tx: watch::Sender<Readiness>,
    fired: AtomicBool,
    errors_tx: broadcast::Sender<FetchResult>,
    live_tx: watch::Sender<i64>,
}

impl Intent {
    /// Build an intent for `reference`.
    ///
    /// Fails when the reference has no namespace kind to route under.
    pub fn new(reference: Reference, error_capacity: usize) -> Result<Arc<Self>, EngineError> {
        let kind = reference.tag().namespace_kind().ok_or_else(|| {
            EngineError::malformed(format!(
                "no namespace kind serves {:?}",
                reference.tag().id()
            ))
        })?;
        let root_reference =
            Reference::new(kind.clone()).with_context(reference.context().clone());
        let route = reference.route();
        let (readiness_tx, _) = watch::channel(Readiness::Pending);
        let (errors_tx, _) = broadcast::channel(error_capacity.max(1));
        let (live_tx, _) = watch::channel(0);
        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            reference,
            kind,
            root_reference,
            route,
            readiness_tx,
            fired: AtomicBool::new(false),
            errors_tx,
            live_tx,
        }))
    }

    /// Signal that a value for the reference has reached the cache.
    ///
    /// Fires at most once over the intent's lifetime; later calls are
    /// no-ops, as are calls after [`fail`](Self::fail).
    pub fn fulfill(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.readiness_tx.send_replace(Readiness::Ready);
        }
    }

    /// Terminally fail the intent. At most one of fulfill/fail ever lands.
    pub fn fail(&self, layer: Layer, error: EngineError) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            let result = FetchResult::error(error, Metadata::new(layer, self.reference.clone()));
            self.readiness_tx.send_replace(Readiness::Failed(result));
        }
    }

    /// Emit a non-terminal error to the subscriber. Does not re-arm or
    /// consume the readiness signal.
    pub fn error(&self, layer: Layer, error: EngineError) {
        let result = FetchResult::error(error, Metadata::new(layer, self.reference.clone()));
        let _ = self.errors_tx.send(result);
    }

    /// Observe readiness transitions.
    pub fn readiness(&self) -> watch::Receiver<Readiness> {
        self.readiness_tx.subscribe()
    }

    /// Observe non-terminal errors.
    pub fn errors(&self) -> broadcast::Receiver<FetchResult> {
        self.errors_tx.subscribe()
    }

    /// Observe the live-subscriber count.
    pub fn live(&self) -> watch::Receiver<i64> {
        self.live_tx.subscribe()
    }

    /// Current live-subscriber count.
    pub fn live_count(&self) -> i64 {
        *self.live_tx.borrow()
    }

    /// Record a new live subscriber.
    pub fn retain(&self) {
        self.live_tx.send_modify(|count| *count += 1);
    }

    /// Record a departed subscriber.
    ///
    /// The decrement lands after a yield so that a cancel immediately
    /// followed by a resubscribe coalesces instead of tearing interest
    /// down to zero and straight back up.
    pub fn release(self: &Arc<Self>) {
        let intent = Arc::clone(self);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            intent.live_tx.send_modify(|count| *count -= 1);
        });
    }

    /// The context carried by the target reference.
    pub fn indices(&self) -> &Context {
        self.reference.context()
    }
}

impl std::fmt::Debug for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Intent")
            .field("id", &self.id)
            .field("reference", &self.reference)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
