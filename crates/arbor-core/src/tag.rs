//! Hierarchical tag namespace.
//!
//! A [`Tag`] is a node in a fixed tree of dot-separated names. Tags compare
//! by their segment sequence, so ordered collections of tags iterate in
//! lexicographic order, which the engine relies on for deterministic
//! routing decisions.

use crate::errors::EngineError;
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A node in the hierarchical name tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    segments: Arc<[String]>,
}

impl Tag {
    /// Parse a dotted identifier such as `"api.assets.price"`.
    ///
    /// Identifiers must be non-empty and must not contain empty segments.
    pub fn parse(id: &str) -> Result<Self, EngineError> {
        if id.is_empty() {
            return Err(EngineError::malformed("empty tag identifier"));
        }
        let segments: Vec<String> = id.split('.').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(EngineError::malformed(format!(
                "tag identifier {id:?} contains an empty segment"
            )));
        }
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Build a tag from segments already known to be valid.
    pub(crate) fn from_segments(segments: Vec<String>) -> Self {
        Self {
            segments: segments.into(),
        }
    }

    /// The dotted identifier of this tag.
    pub fn id(&self) -> String {
        self.segments.join(".")
    }

    /// The ordered name segments from root to leaf.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final name segment.
    pub fn leaf(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Extend this tag with a relative dotted path.
    pub fn descend(&self, path: &str) -> Result<Self, EngineError> {
        let child = Tag::parse(path)?;
        let mut segments = self.segments.to_vec();
        segments.extend(child.segments.iter().cloned());
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Tag) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == *self.segments
    }

    /// Number of edges between two tags through their deepest common
    /// ancestor, or `None` when the tags live in unrelated trees.
    pub fn distance(&self, other: &Tag) -> Option<u32> {
        let common = self
            .segments
            .iter()
            .zip(other.segments.iter())
            .take_while(|(a, b)| a == b)
            .count();
        if common == 0 {
            return None;
        }
        let up = self.segments.len() - common;
        let down = other.segments.len() - common;
        Some((up + down) as u32)
    }

    /// The top-level namespace kind serving this tag.
    ///
    /// A remotely-backed tag needs at least a kind segment and an attribute
    /// path below it; shorter tags have no kind and cannot be subscribed to.
    pub fn namespace_kind(&self) -> Option<Tag> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..1].to_vec().into(),
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.id())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TagVisitor;

        impl Visitor<'_> for TagVisitor {
            type Value = Tag;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a dotted tag identifier")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Tag, E> {
                Tag::parse(v).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(TagVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_and_render() {
        let tag = Tag::parse("api.assets.price").unwrap();
        assert_eq!(tag.id(), "api.assets.price");
        assert_eq!(tag.segments().len(), 3);
        assert_eq!(tag.leaf(), "price");
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert_matches!(Tag::parse(""), Err(EngineError::Malformed { .. }));
        assert_matches!(Tag::parse("a..b"), Err(EngineError::Malformed { .. }));
        assert_matches!(Tag::parse(".a"), Err(EngineError::Malformed { .. }));
    }

    #[test]
    fn ancestor_is_strict() {
        let parent = Tag::parse("api.assets").unwrap();
        let child = Tag::parse("api.assets.price").unwrap();
        assert!(parent.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&parent));
        assert!(!parent.is_ancestor_of(&parent));
    }

    #[test]
    fn distance_through_common_ancestor() {
        let a = Tag::parse("api.assets.price").unwrap();
        let b = Tag::parse("api.assets").unwrap();
        let c = Tag::parse("api.user.currency").unwrap();
        assert_eq!(a.distance(&a), Some(0));
        assert_eq!(b.distance(&a), Some(1));
        assert_eq!(a.distance(&c), Some(4));
        let unrelated = Tag::parse("config.flags").unwrap();
        assert_eq!(a.distance(&unrelated), None);
    }

    #[test]
    fn namespace_kind_requires_attribute_path() {
        let tag = Tag::parse("api.assets.price").unwrap();
        assert_eq!(tag.namespace_kind().unwrap().id(), "api");
        let bare = Tag::parse("api").unwrap();
        assert!(bare.namespace_kind().is_none());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let mut tags = vec![
            Tag::parse("api.user").unwrap(),
            Tag::parse("api.assets.price").unwrap(),
            Tag::parse("api.assets").unwrap(),
        ];
        tags.sort();
        let ids: Vec<String> = tags.iter().map(Tag::id).collect();
        assert_eq!(ids, ["api.assets", "api.assets.price", "api.user"]);
    }

    #[test]
    fn serde_round_trip() {
        let tag = Tag::parse("api.assets").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"api.assets\"");
        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }
}
