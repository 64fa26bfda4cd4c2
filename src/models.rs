//! Data models for the aggregator.
//!
//! This module contains the decoded [`Event`], the running [`Tally`] and the
//! [`Snapshot`] values handed to sinks, along with their record encoding.

use crate::error::{json_kind, ParseError};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Attribute holding the event type.
const TYPE_KEY: &str = "type";

/// One decoded input record.
///
/// Only the `type` attribute is interpreted; everything else is carried as an
/// opaque attribute map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    kind: Option<String>,
    attributes: Map<String, Value>,
}

impl Event {
    /// Creates an event with the given type and no other attributes.
    pub fn new(kind: Option<String>) -> Self {
        Self {
            kind,
            attributes: Map::new(),
        }
    }

    /// Decodes a raw JSON record.
    ///
    /// `"type": null` is treated the same as a missing `type`.
    pub fn decode(raw: impl AsRef<[u8]>) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(raw.as_ref())?;

        let mut attributes = match value {
            Value::Object(map) => map,
            other => {
                return Err(ParseError::NotAnObject {
                    found: json_kind(&other),
                })
            }
        };

        let kind = match attributes.remove(TYPE_KEY) {
            None | Some(Value::Null) => None,
            Some(Value::String(kind)) => Some(kind),
            Some(other) => {
                return Err(ParseError::InvalidType {
                    found: json_kind(&other),
                })
            }
        };

        Ok(Self { kind, attributes })
    }

    /// The event type, if the record carried one.
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Looks up one of the uninterpreted attributes.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Running per-type counts, kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl Tally {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one occurrence of `kind`, pinning the count at `max_count`.
    ///
    /// Returns `false` when the counter was already at the bound.
    pub fn increment(&mut self, kind: &str, max_count: u64) -> bool {
        if let Some(&slot) = self.index.get(kind) {
            let count = &mut self.entries[slot].1;
            if *count >= max_count {
                *count = max_count;
                return false;
            }
            *count += 1;
            return true;
        }

        if max_count == 0 {
            return false;
        }

        self.index.insert(kind.to_string(), self.entries.len());
        self.entries.push((kind.to_string(), 1));
        true
    }

    /// Current count for `kind` (zero if never seen).
    pub fn get(&self, kind: &str) -> u64 {
        self.index
            .get(kind)
            .map(|&slot| self.entries[slot].1)
            .unwrap_or(0)
    }

    /// Number of distinct event types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no event type has been counted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies the current counts into an immutable snapshot.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            entries: self.entries.clone(),
        }
    }
}

/// Point-in-time copy of a [`Tally`].
///
/// Serializes as a flat JSON object in first-seen order, e.g.
/// `{"login":2,"logout":1}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: Vec<(String, u64)>,
}

impl Snapshot {
    /// Count recorded for `kind`, if it had been seen.
    pub fn get(&self, kind: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, count)| *count)
    }

    /// Number of distinct event types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no counts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(type, count)` pairs in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(k, count)| (k.as_str(), *count))
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, (_, count)| acc.saturating_add(*count))
    }

    /// Encodes the snapshot as a single JSON record.
    pub fn encode(&self) -> String {
        // A map of string keys to integers always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Decodes a snapshot record, keeping the record's key order.
    pub fn decode(raw: impl AsRef<[u8]>) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(raw.as_ref())?)
    }
}

impl<K: Into<String>> FromIterator<(K, u64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, count)| (k.into(), count)).collect(),
        }
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (kind, count) in &self.entries {
            map.serialize_entry(kind, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = Snapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of event types to non-negative counts")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
                let mut entries: Vec<(String, u64)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((kind, count)) = access.next_entry::<String, u64>()? {
                    match entries.iter_mut().find(|(k, _)| *k == kind) {
                        Some(entry) => entry.1 = count,
                        None => entries.push((kind, count)),
                    }
                }
                Ok(Snapshot { entries })
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}
