// deep-copy transfer between value domains, and the nil sentinel.
//
// nothing is ever shared by reference across a domain boundary: primitives and
// composites are copied structurally, byte buffers are re-allocated, and
// handles go through the rule registered for their tag in the destination
// domain. the rule decides whether the payload is shared (deep-like objects
// keep their identity) or rebuilt.
//
// the nil sentinel is the one value exempt from all of this: it is a single
// process-wide handle whose identity must survive every crossing, because
// identity is exactly what makes it recognizable on the way back out.

use crate::{
    error::TransferError,
    value::{Handle, Value},
};
use bytes::Bytes;
use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, LazyLock},
};

/// Rule for moving one registered handle category into a domain
///
/// Registered per domain under the handle's tag, normally by a [`Module`]
/// installer or the pool's store init hook, identically in every domain that
/// should accept the category.
///
/// [`Module`]: crate::Module
pub trait HandleRule: Send + Sync {
    /// Produce the destination-side payload for a crossing handle
    ///
    /// Shared-object categories return a clone of the `Arc` so both domains
    /// refer to one payload and the handle keeps its identity; value-like
    /// categories build a fresh payload.
    fn transfer(
        &self,
        payload: &Arc<dyn Any + Send + Sync>,
    ) -> anyhow::Result<Arc<dyn Any + Send + Sync>>;
}

/// The handle categories a domain accepts: tag → rule
///
/// Only touched while the owning domain is exclusively held (shard stores
/// under their shard lock, caller stores by their owning worker), so this is a
/// plain map.
#[derive(Default)]
pub struct TransferRegistry {
    rules: HashMap<Arc<str>, Arc<dyn HandleRule>>,
}

impl TransferRegistry {
    /// Register a rule for a tag, replacing any previous rule
    pub fn register(&mut self, tag: impl Into<Arc<str>>, rule: Arc<dyn HandleRule>) {
        self.rules.insert(tag.into(), rule);
    }

    /// The rule for a tag, if registered
    pub fn rule(&self, tag: &str) -> Option<&Arc<dyn HandleRule>> {
        self.rules.get(tag)
    }
}

// payload type is private: no caller-constructed handle can carry it, and the
// single static below is the only allocation of it, so pointer identity makes
// the sentinel unforgeable.
struct NilSentinel;

static NIL_SENTINEL: LazyLock<Handle> =
    LazyLock::new(|| Handle::new("nil-sentinel", Arc::new(NilSentinel)));

/// The process-wide marker standing in for nil inside storage and transfer
/// buffers
///
/// Queue storage cannot hold absence distinctly from emptiness, so the higher
/// layer substitutes this for nil on the way in and back on the way out via
/// [`toggle_nil_sentinels`]. Callers never observe it across that boundary.
pub fn nil_sentinel() -> Handle {
    NIL_SENTINEL.clone()
}

/// Whether a value is the nil sentinel
pub fn is_nil_sentinel(value: &Value) -> bool {
    matches!(value, Value::Handle(handle) if handle.payload_eq(&NIL_SENTINEL))
}

/// Direction of sentinel substitution
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SentinelDirection {
    /// Staging values into storage: nil becomes the sentinel
    NilToSentinel,
    /// Delivering values to a caller: the sentinel becomes nil
    SentinelToNil,
}

/// Substitute nils and sentinels in place, in the given direction
pub fn toggle_nil_sentinels(values: &mut [Value], direction: SentinelDirection) {
    for value in values {
        match direction {
            SentinelDirection::NilToSentinel => {
                if value.is_nil() {
                    *value = Value::Handle(nil_sentinel());
                }
            }
            SentinelDirection::SentinelToNil => {
                if is_nil_sentinel(value) {
                    *value = Value::Nil;
                }
            }
        }
    }
}

/// Deep-copy a value into the domain whose registry is `into`
///
/// Fails without side effects if the value contains a handle the destination
/// does not accept, or if a rule fails.
pub fn copy_value(value: &Value, into: &TransferRegistry) -> Result<Value, TransferError> {
    Ok(match value {
        Value::Nil => Value::Nil,
        Value::Bool(b) => Value::Bool(*b),
        Value::Int(n) => Value::Int(*n),
        Value::Float(x) => Value::Float(*x),
        Value::Str(s) => Value::Str(s.clone()),
        // re-allocate: domains never share a byte buffer
        Value::Bytes(b) => Value::Bytes(Bytes::copy_from_slice(b)),
        Value::List(elems) => Value::List(
            elems
                .iter()
                .map(|elem| copy_value(elem, into))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(entries) => Value::Map(
            entries
                .iter()
                .map(|(key, value)| Ok((key.deep_clone(), copy_value(value, into)?)))
                .collect::<Result<_, _>>()?,
        ),
        // identity must survive the crossing, so no rule is consulted
        Value::Handle(handle) if handle.payload_eq(&NIL_SENTINEL) => {
            Value::Handle(handle.clone())
        }
        Value::Handle(handle) => {
            let rule = into
                .rule(handle.tag())
                .ok_or_else(|| TransferError::UnregisteredHandle { tag: handle.tag().to_owned() })?;
            let payload =
                rule.transfer(handle.payload()).map_err(|source| TransferError::HandleTransfer {
                    tag: handle.tag().to_owned(),
                    source,
                })?;
            Value::Handle(handle.with_payload(payload))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Key;

    // shares the payload, keeping handle identity
    struct ShareRule;

    impl HandleRule for ShareRule {
        fn transfer(
            &self,
            payload: &Arc<dyn Any + Send + Sync>,
        ) -> anyhow::Result<Arc<dyn Any + Send + Sync>> {
            Ok(Arc::clone(payload))
        }
    }

    struct FailRule;

    impl HandleRule for FailRule {
        fn transfer(
            &self,
            _payload: &Arc<dyn Any + Send + Sync>,
        ) -> anyhow::Result<Arc<dyn Any + Send + Sync>> {
            Err(anyhow::anyhow!("payload cannot cross"))
        }
    }

    #[test]
    fn primitives_copy_structurally() {
        let registry = TransferRegistry::default();
        let value = Value::List(vec![
            Value::Nil,
            Value::Int(3),
            "text".into(),
            Value::Map(vec![(Key::from("k"), Value::Float(0.5))]),
        ]);
        assert_eq!(copy_value(&value, &registry).unwrap(), value);
    }

    #[test]
    fn byte_buffers_are_not_shared_across_domains() {
        let registry = TransferRegistry::default();
        let original = Bytes::from_static(b"payload");
        let copied = copy_value(&Value::Bytes(original.clone()), &registry).unwrap();
        let Value::Bytes(copied) = copied else { panic!("expected bytes") };
        assert_eq!(copied, original);
        assert_ne!(copied.as_ptr(), original.as_ptr());
    }

    #[test]
    fn unregistered_handle_fails_the_transfer() {
        let registry = TransferRegistry::default();
        let value = Value::Handle(Handle::new("sensor", Arc::new(1u8)));
        match copy_value(&value, &registry) {
            Err(TransferError::UnregisteredHandle { tag }) => assert_eq!(tag, "sensor"),
            other => panic!("unexpected: {:?}", other.map(|v| v.kind())),
        }
    }

    #[test]
    fn handle_in_a_composite_fails_the_whole_copy() {
        let registry = TransferRegistry::default();
        let value = Value::List(vec![Value::Int(1), Value::Handle(Handle::new("h", Arc::new(())))]);
        assert!(copy_value(&value, &registry).is_err());
    }

    #[test]
    fn registered_handle_crosses_with_identity_when_shared() {
        let mut registry = TransferRegistry::default();
        registry.register("sensor", Arc::new(ShareRule));
        let handle = Handle::new("sensor", Arc::new(7u32));
        let copied = copy_value(&Value::Handle(handle.clone()), &registry).unwrap();
        assert_eq!(copied, Value::Handle(handle));
    }

    #[test]
    fn failing_rule_reports_the_tag() {
        let mut registry = TransferRegistry::default();
        registry.register("sensor", Arc::new(FailRule));
        let value = Value::Handle(Handle::new("sensor", Arc::new(())));
        match copy_value(&value, &registry) {
            Err(TransferError::HandleTransfer { tag, .. }) => assert_eq!(tag, "sensor"),
            other => panic!("unexpected: {:?}", other.map(|v| v.kind())),
        }
    }

    #[test]
    fn sentinel_crosses_any_domain_and_keeps_identity() {
        let registry = TransferRegistry::default();
        let value = Value::Handle(nil_sentinel());
        let copied = copy_value(&value, &registry).unwrap();
        assert!(is_nil_sentinel(&copied));
    }

    #[test]
    fn sentinel_is_unforgeable() {
        // same tag, different payload: not the sentinel
        let fake = Value::Handle(Handle::new("nil-sentinel", Arc::new(())));
        assert!(!is_nil_sentinel(&fake));
    }

    #[test]
    fn toggle_substitutes_both_directions() {
        let mut values = vec![Value::Nil, Value::Int(1), Value::Nil];
        toggle_nil_sentinels(&mut values, SentinelDirection::NilToSentinel);
        assert!(is_nil_sentinel(&values[0]));
        assert_eq!(values[1], Value::Int(1));
        assert!(is_nil_sentinel(&values[2]));

        toggle_nil_sentinels(&mut values, SentinelDirection::SentinelToNil);
        assert_eq!(values, vec![Value::Nil, Value::Int(1), Value::Nil]);
    }
}
