//! Root actor: discovery and top-level routing for one namespace kind.
//!
//! A root subscribes to its own reference on the discovery transport; each
//! delivered value names the domains currently existing under the kind.
//! Intents buffer until discovery has produced a domain set, then route to
//! the domain nearest their target tag. Discovery failures fail every
//! buffered intent terminally; the next successful delivery returns the
//! root to service.

use crate::domain::DomainHandle;
use crate::intent::Intent;
use crate::shared::Shared;
use arbor_core::{EngineError, Layer, Reference, Tag};
use futures::StreamExt;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub(crate) enum RootCmd {
    Handle(Arc<Intent>),
    Discovered(Result<Vec<Tag>, EngineError>),
}

/// Cloneable address of a root actor.
#[derive(Clone)]
pub(crate) struct RootHandle {
    tx: mpsc::UnboundedSender<RootCmd>,
}

impl RootHandle {
    pub fn spawn(kind: Tag, reference: Reference, shared: Arc<Shared>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = RootActor {
            kind,
            reference,
            shared,
            state: RootState::Requesting,
            domains: BTreeMap::new(),
            pending: Vec::new(),
            discovery: None,
            tx: tx.clone(),
        };
        tokio::spawn(run(actor, rx));
        Self { tx }
    }

    pub fn handle(&self, intent: Arc<Intent>) -> Result<(), EngineError> {
        self.tx
            .send(RootCmd::Handle(intent))
            .map_err(|_| EngineError::internal("root actor is gone"))
    }
}

enum RootState {
    Requesting,
    Ready,
    Error(EngineError),
}

struct RootActor {
    kind: Tag,
    reference: Reference,
    shared: Arc<Shared>,
    state: RootState,
    domains: BTreeMap<Tag, DomainHandle>,
    pending: Vec<Arc<Intent>>,
    discovery: Option<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<RootCmd>,
}

async fn run(mut actor: RootActor, mut rx: mpsc::UnboundedReceiver<RootCmd>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            RootCmd::Handle(intent) => actor.handle(intent),
            RootCmd::Discovered(result) => actor.discovered(result),
        }
    }
    // only reachable when the store itself is going away
    for domain in actor.domains.values() {
        domain.shutdown();
    }
    if let Some(task) = actor.discovery.take() {
        task.abort();
    }
}

impl RootActor {
    fn handle(&mut self, intent: Arc<Intent>) {
        self.ensure_discovery();
        self.pending.push(intent);
        if !matches!(self.state, RootState::Requesting) {
            self.fulfill();
        }
    }

    /// (Re)start the discovery subscription unless one is already running.
    fn ensure_discovery(&mut self) {
        let active = self
            .discovery
            .as_ref()
            .map_or(false, |task| !task.is_finished());
        if active {
            return;
        }
        tracing::debug!(root = %self.kind, "starting discovery subscription");
        let shared = Arc::clone(&self.shared);
        let reference = self.reference.clone();
        let kind = self.kind.clone();
        let tx = self.tx.clone();
        self.discovery = Some(tokio::spawn(async move {
            let mut stream = shared.discovery.discover(&reference).await;
            while let Some(item) = stream.next().await {
                let decoded = item.and_then(|value| decode_domains(&kind, value));
                if tx.send(RootCmd::Discovered(decoded)).is_err() {
                    return;
                }
            }
        }));
    }

    fn discovered(&mut self, result: Result<Vec<Tag>, EngineError>) {
        match result {
            Ok(tags) => {
                let mut next = BTreeMap::new();
                for tag in tags {
                    let domain = self.domains.remove(&tag).unwrap_or_else(|| {
                        DomainHandle::spawn(tag.clone(), self.kind.clone(), Arc::clone(&self.shared))
                    });
                    next.insert(tag, domain);
                }
                // whatever is left was dropped by this redelivery
                for (tag, domain) in std::mem::take(&mut self.domains) {
                    tracing::debug!(root = %self.kind, domain = %tag, "domain removed by discovery, retiring");
                    domain.shutdown();
                }
                self.domains = next;
                self.state = RootState::Ready;
                tracing::debug!(root = %self.kind, domains = self.domains.len(), "domain set delivered");
            }
            Err(error) => {
                tracing::warn!(root = %self.kind, %error, "discovery failed");
                self.shared.reporter.report(&error);
                self.state = RootState::Error(error);
            }
        }
        self.fulfill();
    }

    fn fulfill(&mut self) {
        match &self.state {
            RootState::Requesting => {}
            RootState::Ready => {
                for intent in std::mem::take(&mut self.pending) {
                    match best_match(&self.domains, intent.reference.tag()) {
                        Some(domain) => {
                            if let Err(error) = domain.handle(Arc::clone(&intent)) {
                                self.shared.reporter.report(&error);
                                self.pending.push(intent);
                            }
                        }
                        None => {
                            tracing::warn!(
                                root = %self.kind,
                                target = %intent.reference.tag(),
                                "no domain serves target, rebuffering"
                            );
                            intent.error(
                                Layer::Root,
                                EngineError::routing(format!(
                                    "no domain serves {} under {}",
                                    intent.reference.tag(),
                                    self.kind
                                )),
                            );
                            self.pending.push(intent);
                        }
                    }
                }
            }
            RootState::Error(error) => {
                let error = error.clone();
                for intent in std::mem::take(&mut self.pending) {
                    intent.fail(Layer::Root, error.clone());
                }
            }
        }
    }
}

/// Decode one discovery payload into child-domain tags.
fn decode_domains(kind: &Tag, value: Value) -> Result<Vec<Tag>, EngineError> {
    let Value::Object(map) = value else {
        return Err(EngineError::decode(format!(
            "discovery payload for {kind} is not an object"
        )));
    };
    map.keys().map(|key| kind.descend(key)).collect()
}

/// The domain equal to or an ancestor of `target` with minimum distance.
///
/// Candidates are scanned in the table's lexicographic order and only a
/// strictly smaller distance replaces the current best, so the selection
/// is stable across repeated calls with the same domain set.
fn best_match<'a, V>(domains: &'a BTreeMap<Tag, V>, target: &Tag) -> Option<&'a V> {
    let mut best: Option<(u32, &'a V)> = None;
    for (tag, value) in domains {
        if tag != target && !tag.is_ancestor_of(target) {
            continue;
        }
        let Some(distance) = tag.distance(target) else {
            continue;
        };
        if best.map_or(true, |(nearest, _)| distance < nearest) {
            best = Some((distance, value));
        }
    }
    best.map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn tag(id: &str) -> Tag {
        Tag::parse(id).unwrap()
    }

    fn table(ids: &[&str]) -> BTreeMap<Tag, String> {
        ids.iter().map(|id| (tag(id), (*id).to_owned())).collect()
    }

    #[test]
    fn exact_match_beats_ancestor() {
        let domains = table(&["api.assets", "api.assets.price"]);
        let chosen = best_match(&domains, &tag("api.assets.price")).unwrap();
        assert_eq!(chosen, "api.assets.price");
    }

    #[test]
    fn nearest_ancestor_wins() {
        let domains = table(&["api.assets", "api"]);
        let chosen = best_match(&domains, &tag("api.assets.price.now")).unwrap();
        assert_eq!(chosen, "api.assets");
    }

    #[test]
    fn unrelated_domains_do_not_match() {
        let domains = table(&["api.user", "api.portfolio"]);
        assert!(best_match(&domains, &tag("api.assets.price")).is_none());
    }

    #[test]
    fn selection_is_stable_across_calls() {
        let domains = table(&["api.assets", "api.user", "api"]);
        let first = best_match(&domains, &tag("api.assets.price")).cloned();
        for _ in 0..16 {
            assert_eq!(best_match(&domains, &tag("api.assets.price")).cloned(), first);
        }
    }

    #[test]
    fn decode_expects_an_object() {
        let tags = decode_domains(&tag("api"), json!({"assets": {}, "user": {}})).unwrap();
        let ids: Vec<String> = tags.iter().map(Tag::id).collect();
        assert_eq!(ids, ["api.assets", "api.user"]);
        assert_matches!(
            decode_domains(&tag("api"), json!([1, 2])),
            Err(EngineError::Decode { .. })
        );
    }

    #[test]
    fn decode_rejects_bad_keys() {
        assert_matches!(
            decode_domains(&tag("api"), json!({"": {}})),
            Err(EngineError::Malformed { .. })
        );
    }
}
