//! Addressable references and cache routes.
//!
//! A [`Reference`] is the unit consumers subscribe to: a [`Tag`] plus the
//! [`Context`] indices that specialize it. A reference renders to a
//! [`Route`], the ordered segment sequence used as a cache key. Distinct
//! references can collapse to the same route when their contexts resolve
//! to the same indices.

use crate::context::Context;
use crate::tag::Tag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A tag specialized by context indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    tag: Tag,
    #[serde(default, skip_serializing_if = "Context::is_empty")]
    context: Context,
}

impl Reference {
    /// A reference to `tag` with an empty context.
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            context: Context::new(),
        }
    }

    /// Replace the context of this reference.
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// The referenced tag.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// The context indices attached to this reference.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Render the cache route for this reference.
    ///
    /// The route walks the tag segments root to leaf; wherever the context
    /// carries an index for the prefix tag reached so far, the index is
    /// inserted as an extra segment.
    pub fn route(&self) -> Route {
        let mut segments = Vec::with_capacity(self.tag.segments().len());
        let mut walked = Vec::with_capacity(self.tag.segments().len());
        for segment in self.tag.segments() {
            segments.push(segment.clone());
            walked.push(segment.clone());
            let prefix = Tag::from_segments(walked.clone());
            if let Some(index) = self.context.get(&prefix) {
                segments.push(index.to_owned());
            }
        }
        Route::new(segments)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.route().fmt(f)
    }
}

/// An ordered sequence of location segments keying the shared cache.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Route {
    segments: Vec<String>,
}

impl Route {
    /// Build a route from explicit segments.
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// The ordered location segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether `self` starts with all of `prefix`'s segments.
    pub fn starts_with(&self, prefix: &Route) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments
    }

    /// Whether one route is a prefix of the other, in either direction.
    ///
    /// A write to either of two overlapping routes is visible at the other.
    pub fn overlaps(&self, other: &Route) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}
