//! Tag-keyed index contexts.
//!
//! A [`Context`] specializes a tag into a concrete reference by attaching
//! index values to tags along its path, for example an asset identifier
//! under a collection tag. Contexts are immutable; combining two produces
//! a new one with override-on-conflict semantics.

use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An immutable mapping from tag keys to index values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    indices: BTreeMap<Tag, String>,
}

impl Context {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this context with one additional index.
    pub fn with(&self, key: Tag, index: impl Into<String>) -> Self {
        let mut indices = self.indices.clone();
        indices.insert(key, index.into());
        Self { indices }
    }

    /// The index recorded for `key`, if any.
    pub fn get(&self, key: &Tag) -> Option<&str> {
        self.indices.get(key).map(String::as_str)
    }

    /// Merge two contexts; on conflicting keys the entries of `other` win.
    pub fn merged(&self, other: &Context) -> Self {
        let mut indices = self.indices.clone();
        for (key, index) in &other.indices {
            indices.insert(key.clone(), index.clone());
        }
        Self { indices }
    }

    /// Whether the context carries no indices.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterate entries in deterministic (lexicographic key) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &str)> {
        self.indices.iter().map(|(k, v)| (k, v.as_str()))
    }
}

impl FromIterator<(Tag, String)> for Context {
    fn from_iter<I: IntoIterator<Item = (Tag, String)>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(id: &str) -> Tag {
        Tag::parse(id).unwrap()
    }

    #[test]
    fn with_does_not_mutate_original() {
        let base = Context::new();
        let extended = base.with(tag("api.assets"), "BTC");
        assert!(base.is_empty());
        assert_eq!(extended.get(&tag("api.assets")), Some("BTC"));
    }

    #[test]
    fn merge_overrides_on_conflict() {
        let left = Context::new()
            .with(tag("api.assets"), "BTC")
            .with(tag("api.user"), "alice");
        let right = Context::new().with(tag("api.assets"), "ETH");
        let merged = left.merged(&right);
        assert_eq!(merged.get(&tag("api.assets")), Some("ETH"));
        assert_eq!(merged.get(&tag("api.user")), Some("alice"));
        // operands unchanged
        assert_eq!(left.get(&tag("api.assets")), Some("BTC"));
    }

    #[test]
    fn iteration_order_is_deterministic() {
        let ctx = Context::new()
            .with(tag("b.key"), "2")
            .with(tag("a.key"), "1");
        let keys: Vec<String> = ctx.iter().map(|(k, _)| k.id()).collect();
        assert_eq!(keys, ["a.key", "b.key"]);
    }
}
