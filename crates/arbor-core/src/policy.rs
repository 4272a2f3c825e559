//! Value instances and invalidation policies.
//!
//! Backing implementations emit [`Instance`]s: a payload plus an optional
//! [`InvalidationPolicy`] telling the engine when the payload goes stale.
//! The policy rides as metadata on each value and is re-evaluated on every
//! arrival; the newest value's policy always replaces the previous one.

use crate::errors::EngineError;
use crate::reference::Reference;
use crate::tag::Tag;
use serde::Deserialize;
use std::time::Duration;

/// Declarative rule causing a map to refetch its value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvalidationPolicy {
    /// References whose next change invalidates the value
    pub on: Option<Vec<Reference>>,
    /// Duration after which the value is invalid
    pub after: Option<Duration>,
}

impl InvalidationPolicy {
    /// A policy invalidating on the next change of any of `references`.
    pub fn on_change_of(references: Vec<Reference>) -> Self {
        Self {
            on: Some(references),
            after: None,
        }
    }

    /// A policy invalidating once `after` has elapsed.
    pub fn after(after: Duration) -> Self {
        Self {
            on: None,
            after: Some(after),
        }
    }

    /// Whether the policy carries neither triggers nor a timer.
    pub fn is_empty(&self) -> bool {
        self.on.as_ref().map_or(true, Vec::is_empty) && self.after.is_none()
    }
}

/// One value emitted by a backing implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    /// The payload to merge into the shared cache
    pub data: serde_json::Value,
    /// Optional staleness rule for the payload
    pub policy: Option<InvalidationPolicy>,
}

impl Instance {
    /// An instance with no invalidation policy.
    pub fn new(data: serde_json::Value) -> Self {
        Self { data, policy: None }
    }

    /// An instance carrying an invalidation policy.
    pub fn with_policy(data: serde_json::Value, policy: InvalidationPolicy) -> Self {
        Self {
            data,
            policy: Some(policy),
        }
    }

    /// Decode a wire envelope into an instance.
    ///
    /// The envelope shape is `{"data": <payload>, "invalidate": {"on":
    /// [<tag>], "after": <millis>}}`. A payload that is not an object with
    /// a `data` field is treated as bare data with no policy.
    pub fn decode(raw: serde_json::Value) -> Result<Self, EngineError> {
        let is_envelope = raw.as_object().is_some_and(|map| map.contains_key("data"));
        if !is_envelope {
            return Ok(Self::new(raw));
        }
        let envelope: RawEnvelope = serde_json::from_value(raw)
            .map_err(|e| EngineError::decode(format!("invalid instance envelope: {e}")))?;
        let policy = envelope.invalidate.map(RawPolicy::into_policy).transpose()?;
        Ok(Self {
            data: envelope.data,
            policy: policy.filter(|p| !p.is_empty()),
        })
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    data: serde_json::Value,
    #[serde(default)]
    invalidate: Option<RawPolicy>,
}

#[derive(Deserialize)]
struct RawPolicy {
    #[serde(default)]
    on: Option<Vec<String>>,
    #[serde(default)]
    after: Option<u64>,
}

impl RawPolicy {
    fn into_policy(self) -> Result<InvalidationPolicy, EngineError> {
        let on = self
            .on
            .map(|ids| {
                ids.iter()
                    .map(|id| Tag::parse(id).map(Reference::new))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(InvalidationPolicy {
            on,
            after: self.after.map(Duration::from_millis),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn bare_payload_has_no_policy() {
        let instance = Instance::decode(json!({"price": 42})).unwrap();
        assert_eq!(instance.data, json!({"price": 42}));
        assert!(instance.policy.is_none());
    }

    #[test]
    fn envelope_decodes_triggers_and_timer() {
        let instance = Instance::decode(json!({
            "data": {"price": 42},
            "invalidate": {"on": ["api.user"], "after": 5000}
        }))
        .unwrap();
        assert_eq!(instance.data, json!({"price": 42}));
        let policy = instance.policy.unwrap();
        assert_eq!(policy.after, Some(Duration::from_millis(5000)));
        let on = policy.on.unwrap();
        assert_eq!(on.len(), 1);
        assert_eq!(on[0].tag().id(), "api.user");
    }

    #[test]
    fn envelope_without_invalidate_is_plain_data() {
        let instance = Instance::decode(json!({"data": 7})).unwrap();
        assert_eq!(instance.data, json!(7));
        assert!(instance.policy.is_none());
    }

    #[test]
    fn empty_policy_is_dropped() {
        let instance = Instance::decode(json!({"data": 7, "invalidate": {}})).unwrap();
        assert!(instance.policy.is_none());
    }

    #[test]
    fn bad_trigger_reference_fails_decode() {
        let result = Instance::decode(json!({
            "data": 7,
            "invalidate": {"on": ["not..a.tag"]}
        }));
        assert_matches!(result, Err(EngineError::Malformed { .. }));
    }
}
