//! Domain actor: routing and map ownership for one discovered tag.
//!
//! A domain receives intents from its root, derives the canonical
//! (source, destination) pair for each, and delegates to the map keyed by
//! the destination route, creating it on first need. It also tracks the
//! live-subscriber count of every intent it has routed; the running total
//! is what a map consults when deciding whether an invalidation should
//! refetch immediately or defer.

use crate::intent::Intent;
use crate::map::MapHandle;
use crate::shared::Shared;
use arbor_core::{Context, EngineError, Reference, Tag};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) enum DomainCmd {
    Handle(Arc<Intent>),
    LiveChanged { intent: Uuid, count: i64 },
    IntentClosed { intent: Uuid },
    Shutdown,
}

/// Cloneable address of a domain actor.
#[derive(Clone)]
pub(crate) struct DomainHandle {
    tx: mpsc::UnboundedSender<DomainCmd>,
}

impl DomainHandle {
    pub fn spawn(tag: Tag, kind: Tag, shared: Arc<Shared>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = DomainActor {
            tag,
            kind,
            shared,
            maps: HashMap::new(),
            live_by_intent: HashMap::new(),
            live_total: Arc::new(AtomicI64::new(0)),
            tx: tx.clone(),
        };
        tokio::spawn(run(actor, rx));
        Self { tx }
    }

    pub fn handle(&self, intent: Arc<Intent>) -> Result<(), EngineError> {
        self.tx
            .send(DomainCmd::Handle(intent))
            .map_err(|_| EngineError::internal("domain actor is gone"))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(DomainCmd::Shutdown);
    }
}

struct DomainActor {
    tag: Tag,
    kind: Tag,
    shared: Arc<Shared>,
    maps: HashMap<String, MapHandle>,
    live_by_intent: HashMap<Uuid, i64>,
    live_total: Arc<AtomicI64>,
    tx: mpsc::UnboundedSender<DomainCmd>,
}

async fn run(mut actor: DomainActor, mut rx: mpsc::UnboundedReceiver<DomainCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            DomainCmd::Handle(intent) => actor.handle(intent),
            DomainCmd::LiveChanged { intent, count } => actor.live_changed(intent, count),
            DomainCmd::IntentClosed { intent } => actor.live_changed(intent, 0),
            DomainCmd::Shutdown => break,
        }
    }
    for map in actor.maps.values() {
        map.shutdown();
    }
}

impl DomainActor {
    fn handle(&mut self, intent: Arc<Intent>) {
        let source = self.source_reference(&intent);
        let destination = self.destination_reference(&intent);
        let key = destination.route().to_string();
        let map = match self.maps.get(&key) {
            Some(map) => map.clone(),
            None => {
                tracing::debug!(
                    domain = %self.tag,
                    source = %source,
                    destination = %destination,
                    "creating map"
                );
                let map = MapHandle::spawn(
                    source,
                    destination,
                    Arc::clone(&self.shared),
                    Arc::clone(&self.live_total),
                );
                self.maps.insert(key, map.clone());
                map
            }
        };
        if let Err(error) = map.handle(Arc::clone(&intent)) {
            self.shared.reporter.report(&error);
        }
        self.observe(intent);
    }

    /// Source: the kind's collection entry for this domain, specialized by
    /// the intent's indices. The domain's own identity wins on conflict.
    fn source_reference(&self, intent: &Intent) -> Reference {
        let identity = Context::new().with(self.kind.clone(), self.tag.id());
        Reference::new(self.kind.clone()).with_context(intent.indices().merged(&identity))
    }

    /// Destination: this domain's tag with just the intent's indices.
    fn destination_reference(&self, intent: &Intent) -> Reference {
        Reference::new(self.tag.clone()).with_context(intent.indices().clone())
    }

    /// Follow the intent's live count until it returns to zero.
    fn observe(&self, intent: Arc<Intent>) {
        let tx = self.tx.clone();
        let id = intent.id;
        let mut live = intent.live();
        tokio::spawn(async move {
            let initial = *live.borrow();
            if tx
                .send(DomainCmd::LiveChanged {
                    intent: id,
                    count: initial,
                })
                .is_err()
            {
                return;
            }
            loop {
                match live.changed().await {
                    Ok(()) => {
                        let count = *live.borrow_and_update();
                        if tx
                            .send(DomainCmd::LiveChanged { intent: id, count })
                            .is_err()
                        {
                            return;
                        }
                        if count == 0 {
                            return;
                        }
                    }
                    Err(_) => {
                        let _ = tx.send(DomainCmd::IntentClosed { intent: id });
                        return;
                    }
                }
            }
        });
    }

    fn live_changed(&mut self, intent: Uuid, count: i64) {
        if count == 0 {
            self.live_by_intent.remove(&intent);
        } else {
            self.live_by_intent.insert(intent, count);
        }
        let total: i64 = self.live_by_intent.values().sum();
        self.live_total.store(total, Ordering::SeqCst);
    }
}
