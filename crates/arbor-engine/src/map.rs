//! Map actor: one backing subscription for one (source, destination) pair.
//!
//! A map owns the live subscription to a source's backing implementation,
//! merges every received value into the shared cache at the destination
//! route, fulfills pending intents once synchronized, and applies the
//! invalidation policy carried by the newest value. The backing task is
//! replaced wholesale on every restart, never resumed. The map itself
//! persists for as long as its owning domain does, through any number of
//! subscription restarts.

use crate::intent::Intent;
use crate::shared::Shared;
use arbor_core::{Backing, EngineError, Instance, InvalidationPolicy, Reference, Route};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) enum MapCmd {
    Handle(Arc<Intent>),
    On(Result<Instance, EngineError>),
    Reset { generation: u64 },
    Shutdown,
}

/// Cloneable address of a map actor.
#[derive(Clone)]
pub(crate) struct MapHandle {
    tx: mpsc::UnboundedSender<MapCmd>,
}

impl MapHandle {
    /// Spawn a map for one (source, destination) pair. The backing
    /// subscription starts immediately.
    pub fn spawn(
        source: Reference,
        destination: Reference,
        shared: Arc<Shared>,
        domain_live: Arc<AtomicI64>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = MapActor {
            route: destination.route(),
            source,
            destination,
            shared,
            domain_live,
            pending: Vec::new(),
            synchronized: false,
            dirty: false,
            subscription: None,
            policy_task: None,
            policy_generation: 0,
            tx: tx.clone(),
        };
        tokio::spawn(run(actor, rx));
        Self { tx }
    }

    pub fn handle(&self, intent: Arc<Intent>) -> Result<(), EngineError> {
        self.tx
            .send(MapCmd::Handle(intent))
            .map_err(|_| EngineError::internal("map actor is gone"))
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(MapCmd::Shutdown);
    }
}

struct MapActor {
    source: Reference,
    destination: Reference,
    route: Route,
    shared: Arc<Shared>,
    domain_live: Arc<AtomicI64>,
    pending: Vec<Arc<Intent>>,
    synchronized: bool,
    dirty: bool,
    subscription: Option<JoinHandle<()>>,
    policy_task: Option<JoinHandle<()>>,
    // token for discarding resets queued by a superseded policy
    policy_generation: u64,
    tx: mpsc::UnboundedSender<MapCmd>,
}

async fn run(mut actor: MapActor, mut rx: mpsc::UnboundedReceiver<MapCmd>) {
    actor.start_subscription();
    while let Some(cmd) = rx.recv().await {
        match cmd {
            MapCmd::Handle(intent) => actor.handle(intent),
            MapCmd::On(result) => actor.on(result).await,
            MapCmd::Reset { generation } => actor.reset(generation),
            MapCmd::Shutdown => break,
        }
    }
    actor.abort_tasks();
}

impl MapActor {
    /// Replace the backing subscription task with a fresh one.
    fn start_subscription(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        self.synchronized = false;
        tracing::debug!(map = %self.route, source = %self.source, "starting backing subscription");
        let shared = Arc::clone(&self.shared);
        let source = self.source.clone();
        let destination = self.destination.clone();
        let tx = self.tx.clone();
        self.subscription = Some(tokio::spawn(async move {
            let mut backing = shared.backing.resolve(&source).await;
            while let Some(item) = backing.next().await {
                match item {
                    Ok(Backing::Value(instance)) => {
                        if tx.send(MapCmd::On(Ok(instance))).is_err() {
                            return;
                        }
                    }
                    Ok(Backing::Stream(make)) => {
                        let mut instances = make(destination.clone());
                        while let Some(instance) = instances.next().await {
                            if tx.send(MapCmd::On(Ok(instance))).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Backing::Compute(make)) => {
                        let result = make(destination.clone()).await;
                        if tx.send(MapCmd::On(result)).is_err() {
                            return;
                        }
                    }
                    Err(error) => {
                        if tx.send(MapCmd::On(Err(error))).is_err() {
                            return;
                        }
                    }
                }
            }
        }));
    }

    fn handle(&mut self, intent: Arc<Intent>) {
        self.pending.push(intent);
        if self.dirty {
            self.dirty = false;
            self.start_subscription();
        }
        self.fulfill();
    }

    async fn on(&mut self, result: Result<Instance, EngineError>) {
        match result {
            Ok(instance) => {
                self.synchronized = true;
                self.shared.cache.merge(&self.route, instance.data).await;
                self.install_policy(instance.policy);
                self.fulfill();
            }
            Err(error) => {
                // Pending intents stay unresolved; the sink carries the signal.
                tracing::warn!(map = %self.route, %error, "backing subscription error");
                self.shared.reporter.report(&error);
            }
        }
    }

    fn fulfill(&mut self) {
        if !self.synchronized {
            return;
        }
        for intent in self.pending.drain(..) {
            intent.fulfill();
        }
    }

    /// Install the newest value's policy, superseding any previous one.
    ///
    /// At most one timer or trigger-watch is alive per map; a value that
    /// carries no policy cancels whatever was scheduled for its
    /// predecessor.
    fn install_policy(&mut self, policy: Option<InvalidationPolicy>) {
        if let Some(task) = self.policy_task.take() {
            task.abort();
        }
        self.policy_generation += 1;
        let Some(policy) = policy else { return };
        if policy.is_empty() {
            return;
        }
        tracing::debug!(map = %self.route, ?policy, "installing invalidation policy");
        let generation = self.policy_generation;
        let cache = self.shared.cache.clone();
        let tx = self.tx.clone();
        self.policy_task = Some(tokio::spawn(async move {
            let triggers = policy.on.unwrap_or_default();
            let mut watches = Vec::with_capacity(triggers.len());
            for reference in &triggers {
                watches.push(cache.changes(&reference.route()).await);
            }
            let has_triggers = !watches.is_empty();
            let mut merged = stream::select_all(watches);
            let after = policy.after;
            tokio::select! {
                _ = tokio::time::sleep(after.unwrap_or_default()), if after.is_some() => {}
                _ = merged.next(), if has_triggers => {}
            }
            let _ = tx.send(MapCmd::Reset { generation });
        }));
    }

    /// The installed policy fired: the cached value is stale.
    fn reset(&mut self, generation: u64) {
        if generation != self.policy_generation {
            // queued by a policy that has since been superseded
            return;
        }
        self.synchronized = false;
        if let Some(task) = self.policy_task.take() {
            task.abort();
        }
        if self.domain_live.load(Ordering::SeqCst) == 0 {
            // Nobody is watching; defer the refetch to the next intent.
            tracing::debug!(map = %self.route, "invalidated without live interest, deferring");
            self.dirty = true;
            if let Some(task) = self.subscription.take() {
                task.abort();
            }
        } else {
            tracing::debug!(map = %self.route, "invalidated with live interest, resubscribing");
            self.start_subscription();
        }
    }

    fn abort_tasks(&mut self) {
        if let Some(task) = self.subscription.take() {
            task.abort();
        }
        if let Some(task) = self.policy_task.take() {
            task.abort();
        }
    }
}
