use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The store's native temporal type, converted to [`DateTime<Utc>`] at the
/// materialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoreTimestamp {
    pub seconds: i64,
    pub nanos: u32,
}

impl StoreTimestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    pub fn from_datetime(instant: DateTime<Utc>) -> Self {
        Self {
            seconds: instant.timestamp(),
            nanos: instant.timestamp_subsec_nanos(),
        }
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.seconds, self.nanos).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// A single schemaless document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Timestamp(StoreTimestamp),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn text(raw: impl Into<String>) -> Self {
        Self::Text(raw.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<StoreTimestamp> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Total order used when sorting query results by a field. Values of the
    /// same variant compare naturally; mixed variants fall back to a fixed
    /// variant rank so the sort stays stable and never panics.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Integer(_) => 1,
            Self::Double(_) => 2,
            Self::Text(_) => 3,
            Self::Timestamp(_) => 4,
            Self::List(_) => 5,
            Self::Map(_) => 6,
        }
    }
}

/// A schemaless key/value document, the unit of storage in the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) -> &mut Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.fields.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    pub fn get_timestamp(&self, key: &str) -> Option<StoreTimestamp> {
        self.get(key).and_then(FieldValue::as_timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this document with the named fields removed.
    pub fn without_fields(&self, keys: &[&str]) -> Self {
        let fields = self
            .fields
            .iter()
            .filter(|(key, _)| !keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self { fields }
    }

    /// Top-level merge: fields of `patch` replace same-named fields here,
    /// everything else is kept.
    pub fn merge(&mut self, patch: Document) {
        for (key, value) in patch.fields {
            self.fields.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_round_trips_through_datetime() {
        let original = StoreTimestamp::new(1_700_000_000, 500);

        let round_tripped = StoreTimestamp::from_datetime(original.to_datetime());

        assert_eq!(round_tripped, original);
    }

    #[test]
    fn timestamp_out_of_range_falls_back_to_epoch() {
        let instant = StoreTimestamp::new(i64::MAX, 0).to_datetime();

        assert_eq!(instant, DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn get_str_ignores_non_text_fields() {
        let mut doc = Document::new();
        doc.insert("count", FieldValue::Integer(3));

        assert_eq!(doc.get_str("count"), None);
    }

    #[test]
    fn merge_replaces_only_named_fields() {
        let mut doc = Document::new();
        doc.insert("a", FieldValue::Integer(1));
        doc.insert("b", FieldValue::Integer(2));

        let mut patch = Document::new();
        patch.insert("b", FieldValue::Integer(20));
        patch.insert("c", FieldValue::Integer(30));
        doc.merge(patch);

        assert_eq!(doc.get("a"), Some(&FieldValue::Integer(1)));
        assert_eq!(doc.get("b"), Some(&FieldValue::Integer(20)));
        assert_eq!(doc.get("c"), Some(&FieldValue::Integer(30)));
    }

    #[test]
    fn compare_orders_timestamps_naturally() {
        let earlier = FieldValue::Timestamp(StoreTimestamp::new(100, 0));
        let later = FieldValue::Timestamp(StoreTimestamp::new(200, 0));

        assert_eq!(earlier.compare(&later), Ordering::Less);
        assert_eq!(later.compare(&earlier), Ordering::Greater);
    }
}
