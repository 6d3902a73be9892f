//! Collection - an ordered, cursor-iterable set of entities.
//!
//! Items keep the order they were pushed in (usually the order the store
//! returned them). The cursor walks the items with [`Collection::next`];
//! a cursor equal to the length is the exhausted state.

use crate::{error::Result, Entity, Error, Row, Value};

/// An ordered sequence of entities with a single read cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    items: Vec<Entity>,
    cursor: usize,
}

/// Result of [`Collection::extract_field`].
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// Field values in collection order
    Values(Vec<Value>),
    /// Key/value pairs in first-seen key order; a repeated key keeps its
    /// position and takes the later value
    Keyed(Vec<(Value, Value)>),
}

impl Extracted {
    pub fn len(&self) -> usize {
        match self {
            Extracted::Values(values) => values.len(),
            Extracted::Keyed(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The extracted values, if no key field was given.
    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Extracted::Values(values) => Some(values),
            Extracted::Keyed(_) => None,
        }
    }

    /// Look up the value extracted for `key`.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        match self {
            Extracted::Values(_) => None,
            Extracted::Keyed(pairs) => pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v),
        }
    }
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from dynamic values, each of which must be an
    /// entity.
    pub fn from_array(values: Vec<Value>) -> Result<Self> {
        let mut collection = Self::new();
        for value in values {
            collection.push_value(value)?;
        }
        Ok(collection)
    }

    /// Append an entity.
    pub fn push(&mut self, entity: Entity) {
        self.items.push(entity);
    }

    /// Append a dynamic value, which must be an entity.
    pub fn push_value(&mut self, value: Value) -> Result<()> {
        match value {
            Value::Entity(entity) => {
                self.push(*entity);
                Ok(())
            }
            other => Err(Error::TypeMismatch {
                index: self.items.len(),
                got: other.type_name().to_string(),
            }),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    /// Entity under the cursor.
    pub fn current(&self) -> Option<&Entity> {
        self.items.get(self.cursor)
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    /// Return the entity under the cursor and advance.
    ///
    /// Once exhausted, returns `None`; with `auto_rewind` the cursor wraps
    /// to the start and the first entity is returned instead.
    pub fn next(&mut self, auto_rewind: bool) -> Option<&Entity> {
        if self.cursor >= self.items.len() {
            if !auto_rewind || self.items.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.items.get(index)
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn len(&self) -> usize {
        self.count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate without touching the cursor.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    pub fn into_items(self) -> Vec<Entity> {
        self.items
    }

    /// Take the first entity, dropping the rest.
    pub fn into_first(self) -> Option<Entity> {
        self.items.into_iter().next()
    }

    /// Plain data representation of every entity.
    pub fn to_array(&self, with_computed: bool) -> Vec<Row> {
        self.items
            .iter()
            .map(|entity| entity.to_map(with_computed))
            .collect()
    }

    /// Export as a JSON array of objects.
    pub fn to_json(&self, with_computed: bool) -> serde_json::Value {
        serde_json::Value::Array(
            self.to_array(with_computed)
                .iter()
                .map(|row| {
                    serde_json::Value::Object(
                        row.iter()
                            .map(|(name, value)| (name.clone(), value.to_json()))
                            .collect(),
                    )
                })
                .collect(),
        )
    }

    /// Pull one field out of every entity.
    ///
    /// Rewinds and walks the whole collection, leaving the cursor
    /// exhausted. Without `key_field`, returns the values of `value_field`
    /// in order, skipping nulls unless `include_null`. With `key_field`,
    /// returns key/value pairs; entities whose key is null or absent are
    /// skipped and values are kept even when null.
    pub fn extract_field(
        &mut self,
        value_field: &str,
        key_field: Option<&str>,
        include_null: bool,
    ) -> Extracted {
        let mut values = Vec::new();
        let mut pairs: Vec<(Value, Value)> = Vec::new();

        self.rewind();
        while let Some(entity) = self.next(false) {
            let value = entity.get(value_field).cloned().unwrap_or(Value::Null);
            match key_field {
                None => {
                    if include_null || !value.is_null() {
                        values.push(value);
                    }
                }
                Some(key_field) => {
                    let Some(key) = entity.get(key_field).filter(|k| !k.is_null()) else {
                        continue;
                    };
                    match pairs.iter_mut().find(|(k, _)| k == key) {
                        Some((_, existing)) => *existing = value,
                        None => pairs.push((key.clone(), value)),
                    }
                }
            }
        }

        match key_field {
            None => Extracted::Values(values),
            Some(_) => Extracted::Keyed(pairs),
        }
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
            cursor: 0,
        }
    }
}

impl Extend<Entity> for Collection {
    fn extend<I: IntoIterator<Item = Entity>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldSchema, FieldType, Model};
    use std::sync::Arc;

    fn model() -> Arc<Model> {
        Model::new(
            "payments",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::new("amount", FieldType::Untyped),
            ],
        )
        .into_shared()
    }

    fn entity(id: i64, amount: Value) -> Entity {
        let mut row = Row::new();
        row.insert("id".into(), Value::Int(id));
        row.insert("amount".into(), amount);
        Entity::from_row(model(), row).unwrap()
    }

    fn payments() -> Collection {
        [
            entity(1, Value::Int(10)),
            entity(2, Value::Null),
            entity(3, Value::Int(20)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn next_walks_then_exhausts() {
        let mut c = payments();
        assert_eq!(c.next(false).unwrap().key(), Some(&Value::Int(1)));
        assert_eq!(c.next(false).unwrap().key(), Some(&Value::Int(2)));
        assert_eq!(c.next(false).unwrap().key(), Some(&Value::Int(3)));
        assert!(c.next(false).is_none());
        assert!(c.next(false).is_none());
        assert_eq!(c.cursor(), 3);
        assert!(c.current().is_none());

        c.rewind();
        assert_eq!(c.current().unwrap().key(), Some(&Value::Int(1)));
    }

    #[test]
    fn next_on_empty() {
        let mut c = Collection::new();
        assert!(c.next(false).is_none());
        assert!(c.next(true).is_none());
        assert_eq!(c.cursor(), 0);
    }

    #[test]
    fn next_auto_rewind_wraps() {
        let mut c = payments();
        let len = c.len();
        let mut last = None;
        for _ in 0..=len {
            last = c.next(true).and_then(Entity::key).cloned();
        }
        assert_eq!(last, Some(Value::Int(1)));
        assert_eq!(c.cursor(), 1);
    }

    #[test]
    fn get_out_of_bounds() {
        let c = payments();
        assert!(c.get(2).is_some());
        assert!(c.get(3).is_none());
        assert_eq!(c.count(), 3);
        assert_eq!(c.len(), c.count());
    }

    #[test]
    fn extract_values() {
        let mut c = payments();
        assert_eq!(
            c.extract_field("amount", None, false),
            Extracted::Values(vec![Value::Int(10), Value::Int(20)])
        );
        assert_eq!(
            c.extract_field("amount", None, true),
            Extracted::Values(vec![Value::Int(10), Value::Null, Value::Int(20)])
        );
        assert_eq!(c.cursor(), c.len());
    }

    #[test]
    fn extract_keyed() {
        let mut c: Collection = [entity(1, Value::Int(10)), entity(2, Value::Null)]
            .into_iter()
            .collect();

        let extracted = c.extract_field("amount", Some("id"), false);
        assert_eq!(
            extracted,
            Extracted::Keyed(vec![
                (Value::Int(1), Value::Int(10)),
                (Value::Int(2), Value::Null),
            ])
        );
        assert_eq!(extracted.get(&Value::Int(2)), Some(&Value::Null));
        assert!(extracted.values().is_none());
    }

    #[test]
    fn extract_keyed_skips_missing_keys_and_overwrites_duplicates() {
        let mut c = Collection::new();
        c.push(entity(1, Value::from("a")));
        c.push(entity(1, Value::from("b")));
        c.push(Entity::new(model()));

        let extracted = c.extract_field("amount", Some("id"), true);
        assert_eq!(
            extracted,
            Extracted::Keyed(vec![(Value::Int(1), Value::from("b"))])
        );
    }

    #[test]
    fn from_array_rejects_non_entities() {
        let values = vec![
            Value::from(entity(1, Value::Int(1))),
            Value::from(entity(2, Value::Int(2))),
            Value::from("oops"),
        ];
        let result = Collection::from_array(values);
        assert_eq!(
            result,
            Err(Error::TypeMismatch {
                index: 2,
                got: "Text".into()
            })
        );
    }

    #[test]
    fn items_keep_order() {
        let c = payments();
        let keys: Vec<_> = c.items().iter().filter_map(Entity::key).cloned().collect();
        assert_eq!(keys, vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

        let owned = c.into_items();
        assert_eq!(owned.len(), 3);
        assert_eq!(owned[2].get("amount"), Some(&Value::Int(20)));
    }

    #[test]
    fn from_array_accepts_entities() {
        let c = Collection::from_array(vec![Value::from(entity(1, Value::Int(1)))]).unwrap();
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn to_array_and_json() {
        let mut first = payments().into_first().unwrap();
        first.set_computed_value("note", "hi");
        let c: Collection = std::iter::once(first).collect();

        let plain = c.to_array(false);
        assert_eq!(plain.len(), 1);
        assert!(!plain[0].contains_key("note"));

        let with_computed = c.to_array(true);
        assert_eq!(with_computed[0].get("note"), Some(&Value::from("hi")));

        assert_eq!(
            c.to_json(true),
            serde_json::json!([{"id": 1, "amount": 10, "note": "hi"}])
        );
    }
}
