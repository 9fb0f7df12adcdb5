use once_cell::sync::Lazy;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::sync::Arc;
use std::{
    cmp::Ordering,
    hash::{Hash, Hasher},
};

use opentelemetry::{Array, Key, KeyValue, Value};
use ordered_float::OrderedFloat;

/// A [KeyValue] with total ordering and hashing, floats included.
#[derive(Clone, Debug)]
struct HashKeyValue(KeyValue);

impl Hash for HashKeyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key.hash(state);
        type_order(&self.0.value).hash(state);
        match &self.0.value {
            Value::Bool(b) => b.hash(state),
            Value::I64(i) => i.hash(state),
            Value::F64(f) => OrderedFloat(*f).hash(state),
            Value::String(s) => s.as_str().hash(state),
            Value::Array(Array::Bool(b)) => b.hash(state),
            Value::Array(Array::I64(i)) => i.hash(state),
            Value::Array(Array::F64(f)) => f.iter().for_each(|f| OrderedFloat(*f).hash(state)),
            Value::Array(Array::String(s)) => s.iter().for_each(|s| s.as_str().hash(state)),
            other => other.to_string().hash(state),
        }
    }
}

impl PartialOrd for HashKeyValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HashKeyValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .key
            .cmp(&other.0.key)
            .then_with(|| cmp_value(&self.0.value, &other.0.value))
    }
}

impl PartialEq for HashKeyValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashKeyValue {}

fn cmp_value(a: &Value, b: &Value) -> Ordering {
    match type_order(a).cmp(&type_order(b)) {
        Ordering::Equal => match (a, b) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::I64(a), Value::I64(b)) => a.cmp(b),
            (Value::F64(a), Value::F64(b)) => OrderedFloat(*a).cmp(&OrderedFloat(*b)),
            (Value::String(a), Value::String(b)) => a.as_str().cmp(b.as_str()),
            (Value::Array(Array::Bool(a)), Value::Array(Array::Bool(b))) => a.cmp(b),
            (Value::Array(Array::I64(a)), Value::Array(Array::I64(b))) => a.cmp(b),
            (Value::Array(Array::F64(a)), Value::Array(Array::F64(b))) => a
                .iter()
                .map(|x| OrderedFloat(*x))
                .cmp(b.iter().map(|x| OrderedFloat(*x))),
            (Value::Array(Array::String(a)), Value::Array(Array::String(b))) => a
                .iter()
                .map(|s| s.as_str())
                .cmp(b.iter().map(|s| s.as_str())),
            (a, b) => a.to_string().cmp(&b.to_string()),
        },
        other => other,
    }
}

fn type_order(v: &Value) -> u8 {
    match v {
        Value::Bool(_) => 1,
        Value::I64(_) => 2,
        Value::F64(_) => 3,
        Value::String(_) => 4,
        Value::Array(Array::Bool(_)) => 5,
        Value::Array(Array::I64(_)) => 6,
        Value::Array(Array::F64(_)) => 7,
        Value::Array(Array::String(_)) => 8,
        _ => 9,
    }
}

static EMPTY_SET: Lazy<Arc<InternalAttributeSet>> =
    Lazy::new(|| Arc::new(InternalAttributeSet::new(Vec::with_capacity(0))));

#[derive(Eq, PartialEq, Debug)]
struct InternalAttributeSet {
    key_values: Vec<HashKeyValue>,
    hash: u64,
}

impl InternalAttributeSet {
    fn new(mut values: Vec<HashKeyValue>) -> Self {
        values.sort_unstable();
        let mut hasher = DefaultHasher::new();
        values.iter().fold(&mut hasher, |hasher, item| {
            item.hash(hasher);
            hasher
        });

        InternalAttributeSet {
            key_values: values,
            hash: hasher.finish(),
        }
    }

    /// Keeps the last value given for a repeated key.
    fn from_key_values<'a>(values: impl DoubleEndedIterator<Item = &'a KeyValue>) -> Self {
        let mut seen_keys: HashSet<Key> = HashSet::new();
        let vec = values
            .rev()
            .filter(|kv| seen_keys.insert(kv.key.clone()))
            .map(|kv| HashKeyValue(kv.clone()))
            .collect::<Vec<_>>();

        InternalAttributeSet::new(vec)
    }
}

impl Hash for InternalAttributeSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash)
    }
}

/// The identity of a time series: an unordered set of attributes.
///
/// Two sets are equal when they hold the same key/value pairs, regardless of
/// the order the attributes were given in. When a key is repeated, the last
/// value wins.
///
/// This must implement [Hash], [PartialEq], and [Eq] so it may be used as
/// HashMap keys and other de-duplication methods.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AttributeSet(Arc<InternalAttributeSet>);

impl From<&[KeyValue]> for AttributeSet {
    fn from(values: &[KeyValue]) -> Self {
        AttributeSet(Arc::new(InternalAttributeSet::from_key_values(
            values.iter(),
        )))
    }
}

impl From<Vec<KeyValue>> for AttributeSet {
    fn from(values: Vec<KeyValue>) -> Self {
        AttributeSet::from(values.as_slice())
    }
}

impl<const N: usize> From<[KeyValue; N]> for AttributeSet {
    fn from(values: [KeyValue; N]) -> Self {
        AttributeSet::from(&values[..])
    }
}

impl AttributeSet {
    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.0.key_values.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.0.key_values.is_empty()
    }

    /// Iterate over key value pairs in the set, sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.0.key_values.iter().map(|kv| (&kv.0.key, &kv.0.value))
    }

    /// Copies the attributes out, sorted by key.
    pub fn to_vec(&self) -> Vec<KeyValue> {
        self.0.key_values.iter().map(|kv| kv.0.clone()).collect()
    }
}

impl Default for AttributeSet {
    fn default() -> Self {
        AttributeSet(EMPTY_SET.clone())
    }
}
