// the transferable value model.
//
// values are plain data plus `Handle`, the escape hatch for specially
// registered categories. whether a handle can enter a given domain is decided
// by that domain's transfer registry, not here.

use bytes::Bytes;
use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

/// A value that can move between value domains
///
/// Composites hold transferable values all the way down. Whether a `Handle`
/// can actually cross into a particular domain depends on the rules registered
/// there; everything else always transfers.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absence as a first-class value
    Nil,
    /// Boolean
    Bool(bool),
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Text
    Str(String),
    /// Binary data
    Bytes(Bytes),
    /// Ordered sequence of values
    List(Vec<Value>),
    /// Keyed collection of values
    Map(Vec<(Key, Value)>),
    /// A registered transferable handle
    Handle(Handle),
}

impl Value {
    /// Whether this is `Value::Nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Category name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Handle(_) => "handle",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        match key {
            Key::Bool(b) => Value::Bool(b),
            Key::Int(n) => Value::Int(n),
            Key::Float(bits) => Value::Float(bits.get()),
            Key::Str(s) => Value::Str(s),
            Key::Bytes(b) => Value::Bytes(b),
        }
    }
}

/// The subset of values usable as queue keys
///
/// Keys must hash and compare stably across domains, so they are restricted to
/// plain data. Floats are keyed by their IEEE bit pattern: the different NaN
/// encodings are distinct keys, and `-0.0` and `0.0` are distinct keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// Boolean key
    Bool(bool),
    /// Integer key
    Int(i64),
    /// Float key, compared and hashed by bit pattern
    Float(FloatBits),
    /// Text key
    Str(String),
    /// Binary key
    Bytes(Bytes),
}

impl Key {
    /// Convert a value into a key, or `None` for the non-key categories
    /// (nil, composites, handles)
    pub fn from_value(value: &Value) -> Option<Key> {
        Some(match value {
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(n) => Key::Int(*n),
            Value::Float(x) => Key::Float(FloatBits::new(*x)),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Bytes(b) => Key::Bytes(b.clone()),
            Value::Nil | Value::List(_) | Value::Map(_) | Value::Handle(_) => return None,
        })
    }

    // clone into another domain. byte buffers are re-allocated so the two
    // domains never share backing storage.
    pub(crate) fn deep_clone(&self) -> Key {
        match self {
            Key::Bytes(b) => Key::Bytes(Bytes::copy_from_slice(b)),
            other => other.clone(),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_owned())
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

/// An `f64` wrapped for use as a key: equality and hashing follow the bit
/// pattern, not IEEE comparison
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FloatBits(u64);

impl FloatBits {
    /// Wrap a float
    pub fn new(x: f64) -> Self {
        FloatBits(x.to_bits())
    }

    /// The wrapped float
    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }
}

impl Debug for FloatBits {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

/// A specially-registered transferable handle: a tag naming its category plus
/// a shared opaque payload
///
/// Handles compare equal by payload identity, so a handle remains equal to
/// itself only when its transfer rule shares the payload rather than copying
/// it. A handle whose tag has no rule registered in a destination domain
/// cannot cross into that domain.
#[derive(Clone)]
pub struct Handle {
    tag: Arc<str>,
    payload: Arc<dyn Any + Send + Sync>,
}

impl Handle {
    /// Construct a handle from its category tag and payload
    pub fn new(tag: impl Into<Arc<str>>, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Handle { tag: tag.into(), payload }
    }

    /// The category tag
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The shared payload
    pub fn payload(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.payload
    }

    /// Borrow the payload as a concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }

    /// Whether two handles share one payload allocation
    pub fn payload_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }

    // same category, different payload. used when a transfer rule produces the
    // destination-side payload for a crossing handle.
    pub(crate) fn with_payload(&self, payload: Arc<dyn Any + Send + Sync>) -> Handle {
        Handle { tag: Arc::clone(&self.tag), payload }
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Handle) -> bool {
        self.payload_eq(other)
    }
}

impl Debug for Handle {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "Handle({}: {:p})", self.tag, Arc::as_ptr(&self.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_from_value_accepts_plain_data() {
        assert_eq!(Key::from_value(&Value::Int(7)), Some(Key::Int(7)));
        assert_eq!(Key::from_value(&Value::Bool(true)), Some(Key::Bool(true)));
        assert_eq!(Key::from_value(&"k".into()), Some(Key::from("k")));
        assert_eq!(
            Key::from_value(&Value::Bytes(Bytes::from_static(b"k"))),
            Some(Key::Bytes(Bytes::from_static(b"k"))),
        );
    }

    #[test]
    fn key_from_value_rejects_non_keys() {
        assert_eq!(Key::from_value(&Value::Nil), None);
        assert_eq!(Key::from_value(&Value::List(vec![])), None);
        assert_eq!(Key::from_value(&Value::Map(vec![])), None);
        let handle = Handle::new("h", Arc::new(1u8));
        assert_eq!(Key::from_value(&Value::Handle(handle)), None);
    }

    #[test]
    fn float_keys_compare_by_bits() {
        assert_eq!(Key::Float(FloatBits::new(1.5)), Key::Float(FloatBits::new(1.5)));
        assert_ne!(Key::Float(FloatBits::new(0.0)), Key::Float(FloatBits::new(-0.0)));
        // NaN keys are equal to themselves, unlike the floats they wrap
        assert_eq!(Key::Float(FloatBits::new(f64::NAN)), Key::Float(FloatBits::new(f64::NAN)));
    }

    #[test]
    fn key_round_trips_through_value() {
        for key in [Key::Bool(false), Key::Int(-3), Key::from("x")] {
            assert_eq!(Key::from_value(&Value::from(key.clone())), Some(key));
        }
    }

    #[test]
    fn handle_equality_is_payload_identity() {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(42u32);
        let a = Handle::new("h", Arc::clone(&payload));
        let b = Handle::new("h", payload);
        let c = Handle::new("h", Arc::new(42u32));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u32>(), Some(&42));
    }
}
