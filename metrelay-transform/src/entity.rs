use std::borrow::Borrow;
use std::fmt;

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::ser::{Serialize, Serializer};

use crate::tags::Tags;

/// Largest magnitude at which every integer is exactly representable in an `f64`.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A single field value of an event record.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// A numeric metric value.
    Number(f64),
    /// A value extracted from the metric name, a rendered label or a tag.
    Text(String),
}

impl Serialize for FieldValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            // Integral values are written without a fraction so `1` does not become `1.0`.
            Self::Number(value) if value.fract() == 0.0 && value.abs() <= MAX_SAFE_INTEGER => {
                serializer.serialize_i64(*value as i64)
            }
            Self::Number(value) => serializer.serialize_f64(*value),
            Self::Text(value) => serializer.serialize_str(value),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Fields of one event, in insertion order.
pub type Fields = IndexMap<String, FieldValue>;

/// Identifies the entity a record belongs to.
///
/// The key is `<type>:<name>`, followed by the JSON encoding of the metric's tags if there are
/// any. Metrics with different tags therefore never share a record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(String);

impl EntityKey {
    /// Builds the key for an entity and the tags of the metric that produced it.
    pub fn new(entity_type: &str, entity_name: &str, tags: &Tags) -> Self {
        let mut key = format!("{entity_type}:{entity_name}");

        if !tags.is_empty() {
            if let Ok(json) = serde_json::to_string(tags) {
                key.push_str(&json);
            }
        }

        Self(key)
    }

    /// Returns the key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name and type of an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    /// The rendered entity name.
    pub name: String,
    /// The rendered entity type.
    pub ty: String,
}

/// All events collected for one entity during a flush cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct EntityRecord {
    /// The entity these events describe.
    pub entity: Entity,
    /// Fields per event type, in the order event types were first seen.
    pub metrics: IndexMap<String, Fields>,
}

impl EntityRecord {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            metrics: IndexMap::new(),
        }
    }

    /// Returns the fields of the given event type, creating them if necessary.
    pub fn fields_mut(&mut self, event_type: &str) -> &mut Fields {
        if !self.metrics.contains_key(event_type) {
            self.metrics.insert(event_type.to_owned(), Fields::new());
        }

        &mut self.metrics[event_type]
    }
}

/// Entity records of one flush cycle, keyed by [`EntityKey`] in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityMap {
    records: IndexMap<EntityKey, EntityRecord>,
}

impl EntityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, creating it for the given entity on first use.
    ///
    /// The entity of an existing record is not updated.
    pub fn record_mut(&mut self, key: EntityKey, entity: Entity) -> &mut EntityRecord {
        match self.records.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(EntityRecord::new(entity)),
        }
    }

    /// Returns the record stored under the given key.
    pub fn get(&self, key: &str) -> Option<&EntityRecord> {
        self.records.get(key)
    }

    /// Iterates records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityKey, &EntityRecord)> {
        self.records.iter()
    }

    /// Returns the number of entities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no entity was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_key_untagged() {
        let key = EntityKey::new("Redis Cluster", "Production Host1", &Tags::new());
        assert_eq!(key.as_str(), "Redis Cluster:Production Host1");
    }

    #[test]
    fn test_entity_key_tagged() {
        let mut tags = Tags::new();
        tags.insert("t1".to_owned(), "v1".to_owned());
        tags.insert("a".to_owned(), "b".to_owned());

        let key = EntityKey::new("Redis Cluster", "Host1", &tags);
        assert_eq!(key.as_str(), r#"Redis Cluster:Host1{"t1":"v1","a":"b"}"#);
    }

    #[test]
    fn test_record_created_once() {
        let mut map = EntityMap::new();
        let key = EntityKey::new("t", "n", &Tags::new());

        let entity = Entity {
            name: "n".to_owned(),
            ty: "t".to_owned(),
        };
        map.record_mut(key.clone(), entity.clone())
            .fields_mut("Sample")
            .insert("a".to_owned(), 1.0.into());
        map.record_mut(key, entity)
            .fields_mut("Sample")
            .insert("b".to_owned(), 2.0.into());

        assert_eq!(map.len(), 1);
        let record = map.get("t:n").unwrap();
        assert_eq!(record.metrics["Sample"].len(), 2);
    }

    #[test]
    fn test_field_value_serialization() {
        let values = vec![
            FieldValue::Number(1.0),
            FieldValue::Number(-3.0),
            FieldValue::Number(0.5),
            FieldValue::Number(1e300),
            FieldValue::from("myapp"),
        ];

        assert_eq!(
            serde_json::to_string(&values).unwrap(),
            r#"[1,-3,0.5,1e300,"myapp"]"#
        );
    }
}
