//! # Interface model and fingerprinting
//!
//! ## Responsibility
//! Define the configuration map being optimized ([`Interface`]), its values
//! ([`Value`]), the canonical content identifier used as the cache key
//! ([`Fingerprint`]), and the single merge policy shared by the consensus
//! store and the engine ([`merge_values`]).
//!
//! ## Guarantees
//! - Order-independent: an [`Interface`] is backed by a `BTreeMap`, so two
//!   maps with the same pairs iterate identically regardless of insertion order
//! - Stable: [`Fingerprint::of`] hashes a fixed, versioned byte encoding with
//!   BLAKE3; the result does not depend on process, platform or run
//! - Type-stable: `-0.0` and `0.0` fingerprint identically, as do all NaN payloads
//!
//! ## NOT Responsible For
//! - Bit-vector encoding for the transform (that belongs to `codec`)
//! - Storing shared knowledge (that belongs to `consensus`)

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain separator mixed into every fingerprint.
const FINGERPRINT_DOMAIN: &[u8] = b"interface-optimizer/fingerprint/v1";

// Value type tags (1-byte prefix) in the canonical encoding.
const TAG_NUMBER: u8 = 0x01;
const TAG_BOOL: u8 = 0x02;
const TAG_TEXT: u8 = 0x03;

/// A single configuration value: numeric, or opaque to the optimizer.
///
/// Only [`Value::Number`] participates in averaging and rescaling; booleans
/// and text are carried through unchanged and merged by overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A numeric parameter.
    Number(f64),
    /// An opaque flag.
    Bool(bool),
    /// An opaque string.
    Text(String),
}

impl Value {
    /// Return the numeric payload, or `None` for opaque values.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Append the canonical, type-tagged byte encoding of this value.
    pub(crate) fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            Self::Number(n) => {
                out.push(TAG_NUMBER);
                out.extend_from_slice(&canonical_f64_bits(*n).to_be_bytes());
            }
            Self::Bool(b) => {
                out.push(TAG_BOOL);
                out.push(u8::from(*b));
            }
            Self::Text(s) => {
                out.push(TAG_TEXT);
                out.extend_from_slice(&(s.len() as u64).to_be_bytes());
                out.extend_from_slice(s.as_bytes());
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Collapse `-0.0` onto `0.0` and every NaN onto one quiet NaN.
fn canonical_f64_bits(n: f64) -> u64 {
    if n == 0.0 {
        0.0f64.to_bits()
    } else if n.is_nan() {
        f64::NAN.to_bits()
    } else {
        n.to_bits()
    }
}

/// The named configuration being optimized.
///
/// Keys are kept sorted, so iteration order is canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interface(BTreeMap<String, Value>);

impl Interface {
    /// Create an empty interface.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Insert a field, returning the previous value if the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Interface::insert`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `true` if the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate fields in canonical (sorted) key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Iterate fields mutably in canonical key order.
    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, String, Value> {
        self.0.iter_mut()
    }

    /// Iterate keys in canonical order.
    pub fn keys(&self) -> btree_map::Keys<'_, String, Value> {
        self.0.keys()
    }

    /// Compute this interface's [`Fingerprint`].
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Canonical byte serialization: domain tag, field count, then each
    /// length-prefixed key followed by its type-tagged value.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(FINGERPRINT_DOMAIN.len() + 8 + self.0.len() * 24);
        out.extend_from_slice(FINGERPRINT_DOMAIN);
        out.extend_from_slice(&(self.0.len() as u64).to_be_bytes());
        for (key, value) in &self.0 {
            out.extend_from_slice(&(key.len() as u64).to_be_bytes());
            out.extend_from_slice(key.as_bytes());
            value.write_canonical(&mut out);
        }
        out
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Interface {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for Interface {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Interface {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Canonical content identifier of an [`Interface`], used as the cache key.
///
/// A 32-byte BLAKE3 digest of [`Interface::canonical_bytes`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint an interface.
    pub fn of(interface: &Interface) -> Self {
        Self(*blake3::hash(&interface.canonical_bytes()).as_bytes())
    }

    /// Lowercase hex rendering (64 characters).
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// First 8 hex characters, for log lines.
    pub fn short(&self) -> String {
        self.0[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Merge an existing value with an incoming one.
///
/// - both numeric: arithmetic mean (merging `v` with `v` yields `v` exactly)
/// - otherwise: the incoming value overwrites the existing one
pub fn merge_values(existing: &Value, incoming: &Value) -> Value {
    match (existing, incoming) {
        (Value::Number(a), Value::Number(b)) => Value::Number(mean(*a, *b)),
        _ => incoming.clone(),
    }
}

fn mean(a: f64, b: f64) -> f64 {
    if a == b {
        return a;
    }
    let sum = a + b;
    if sum.is_finite() {
        sum / 2.0
    } else {
        a / 2.0 + b / 2.0
    }
}
