//! Entity - one mapped record with change tracking.
//!
//! An entity keeps three maps apart:
//!
//! - **current values**: decoded values loaded from storage
//! - **pending changes**: values staged by `set_value`, not yet committed
//! - **computed values**: derived values such as populated foreign entities,
//!   never persisted
//!
//! Values passed at construction always decode into current values; values
//! set afterwards always go to pending changes. Plain reads only see current
//! and computed values; use [`Entity::merged`] to view staged changes.
//!
//! Committing does not mutate the entity. [`Entity::commit`] writes the
//! encoded changes through a [`QueryStore`] and returns a freshly loaded
//! entity reflecting what the store holds.

use crate::codec::Direction;
use crate::model::{into_persistence, ModelRegistry};
use crate::store::QueryStore;
use crate::{error::Result, Error, Model, Row, Value};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Entity {
    model: Arc<Model>,
    key: Option<Value>,
    current: Row,
    pending: Row,
    computed: Row,
    new: bool,
}

impl Entity {
    /// Create an entity with no persisted backing.
    pub fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            key: None,
            current: Row::new(),
            pending: Row::new(),
            computed: Row::new(),
            new: true,
        }
    }

    /// Load an entity from a raw storage row, decoding every field.
    ///
    /// An empty row yields a new entity.
    pub fn from_row(model: Arc<Model>, row: Row) -> Result<Self> {
        let mut entity = Self::new(model);
        if row.is_empty() {
            return Ok(entity);
        }

        entity.new = false;
        for (name, value) in row {
            let value = entity
                .model
                .transform(&name, value, Direction::Decode, false)?;
            if name == entity.model.key_field() {
                entity.key = Some(value.clone()).filter(|k| !k.is_null());
            }
            entity.current.insert(name, value);
        }
        Ok(entity)
    }

    /// Read a field: current value, else computed value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.current.get(name).or_else(|| self.computed.get(name))
    }

    /// Whether the field has a non-null current value.
    pub fn has(&self, name: &str) -> bool {
        self.current.get(name).is_some_and(|v| !v.is_null())
    }

    /// Field assignment. Same as [`Entity::set_value`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.set_value(name, value);
    }

    /// Stage a change. The value is encoded at commit time.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.pending.insert(name.into(), value.into());
    }

    /// Stage every entry of `values`.
    pub fn set_values(&mut self, values: Row) {
        for (name, value) in values {
            self.set_value(name, value);
        }
    }

    /// Reset a field's current value to its decoded default.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        self.set_default_value(name)
    }

    /// Reset a field's current value to its decoded default.
    pub fn set_default_value(&mut self, name: &str) -> Result<()> {
        let value = self
            .model
            .transform(name, Value::Null, Direction::Decode, true)?;
        self.current.insert(name.to_string(), value);
        Ok(())
    }

    /// Drop every pending change.
    pub fn revert_unsaved_data(&mut self) {
        self.pending.clear();
    }

    pub fn set_computed_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.computed.insert(name.into(), value.into());
    }

    /// Current (loaded) values.
    pub fn data(&self) -> &Row {
        &self.current
    }

    /// Pending (unsaved) changes.
    pub fn unsaved_data(&self) -> &Row {
        &self.pending
    }

    pub fn computed(&self) -> &Row {
        &self.computed
    }

    /// Current values overlaid with pending changes.
    pub fn merged(&self) -> Row {
        let mut merged = self.current.clone();
        merged.extend(self.pending.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    pub fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    pub fn is_new(&self) -> bool {
        self.new
    }

    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn table_name(&self) -> &str {
        self.model.table()
    }

    pub fn key_field(&self) -> &str {
        self.model.key_field()
    }

    /// Encode a value the way `commit` would for field `name`.
    pub fn normalize_field(&self, name: &str, value: Value) -> Result<Value> {
        self.model.transform(name, value, Direction::Encode, false)
    }

    /// Plain data representation: current values, plus computed values when
    /// `with_computed` is set.
    pub fn to_map(&self, with_computed: bool) -> Row {
        let mut map = self.current.clone();
        if with_computed {
            map.extend(self.computed.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        map
    }

    /// Write pending changes and return the reloaded entity.
    ///
    /// Inserts when the entity has no key, otherwise updates the single row
    /// with this key. Returns `Ok(None)` when nothing is pending. On failure
    /// the pending changes are left in place, so the commit can be retried.
    pub fn commit(&self, store: &dyn QueryStore) -> Result<Option<Entity>> {
        if self.pending.is_empty() {
            tracing::debug!(table = self.table_name(), "nothing to commit");
            return Ok(None);
        }

        let mut changes = Row::new();
        for (name, value) in &self.pending {
            let encoded = self
                .model
                .transform(name, value.clone(), Direction::Encode, false)?;
            changes.insert(name.clone(), encoded);
        }

        if self.model.config().enforce_required {
            self.model.check_required(&changes, self.key.is_none())?;
        }

        let table = self.model.table();
        let key = match &self.key {
            None => {
                let key = store.insert(table, &changes).map_err(into_persistence)?;
                tracing::debug!(table, key = %key, fields = changes.len(), "inserted entity");
                key
            }
            Some(key) => {
                let changed = store
                    .update(table, &changes, self.model.key_field(), key, 1)
                    .map_err(into_persistence)?;
                tracing::debug!(table, key = %key, changed, "updated entity");
                key.clone()
            }
        };

        let reloaded = self.model.select_by_key(store, &key)?.into_first();
        reloaded.map(Some).ok_or_else(|| Error::RecordNotFound {
            table: table.to_string(),
            key: key.to_string(),
        })
    }

    /// Remove this entity's row from the store.
    pub fn delete(&self, store: &dyn QueryStore) -> Result<u64> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::MissingKey(self.table_name().to_string()))?;
        let removed = store
            .delete(self.table_name(), self.key_field(), key, 1)
            .map_err(into_persistence)?;
        tracing::debug!(table = self.table_name(), key = %key, removed, "deleted entity");
        Ok(removed)
    }

    /// Resolve `populate` rules into computed values.
    ///
    /// For each field with a populate rule (only those named in `fields`,
    /// or all when `fields` is empty), the foreign model is looked up in
    /// `models` and queried by this field's value. The first match, or
    /// null, is stored under the rule's target field.
    pub fn populate(
        &mut self,
        store: &dyn QueryStore,
        models: &ModelRegistry,
        fields: &[&str],
    ) -> Result<()> {
        let model = Arc::clone(&self.model);
        for field in model.fields() {
            let Some(rule) = &field.populate else {
                continue;
            };
            if !fields.is_empty() && !fields.contains(&field.name.as_str()) {
                continue;
            }

            let foreign = models.get(rule.model())?;
            let resolved = match self.get(&field.name) {
                Some(key) if !key.is_null() => foreign
                    .select_by_key(store, key)?
                    .into_first()
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            };

            tracing::debug!(
                field = %field.name,
                model = rule.model(),
                found = !resolved.is_null(),
                "populated field"
            );
            self.computed.insert(rule.target_field(&field.name), resolved);
        }
        Ok(())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.model.table() == other.model.table()
            && self.key == other.key
            && self.new == other.new
            && self.current == other.current
            && self.pending == other.pending
            && self.computed == other.computed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldSchema, FieldType, MemoryStore, OrderBy, PopulateRule};

    fn post_model() -> Arc<Model> {
        Model::new(
            "posts",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::new("title", FieldType::String),
                FieldSchema::new("published", FieldType::Boolean),
                FieldSchema::new("tags", FieldType::Set),
                FieldSchema::new("views", FieldType::Integer).with_default(0),
            ],
        )
        .into_shared()
    }

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_table("posts", "id")
            .with_table("users", "id")
    }

    #[test]
    fn from_row_decodes_into_current() {
        let entity = Entity::from_row(
            post_model(),
            row(&[
                ("id", Value::from("5")),
                ("title", Value::from("Hi &amp; bye")),
                ("published", Value::from("Y")),
                ("tags", Value::from("a,b")),
            ]),
        )
        .unwrap();

        assert!(!entity.is_new());
        assert_eq!(entity.key(), Some(&Value::Int(5)));
        assert_eq!(entity.get("id"), Some(&Value::Int(5)));
        assert_eq!(entity.get("title"), Some(&Value::from("Hi & bye")));
        assert_eq!(entity.get("published"), Some(&Value::Bool(true)));
        assert_eq!(entity.get("tags"), Some(&Value::from(vec!["a", "b"])));
        assert!(entity.unsaved_data().is_empty());
    }

    #[test]
    fn empty_row_is_new() {
        let entity = Entity::from_row(post_model(), Row::new()).unwrap();
        assert!(entity.is_new());
        assert!(entity.key().is_none());
    }

    #[test]
    fn pending_changes_are_not_read_back() {
        let mut entity =
            Entity::from_row(post_model(), row(&[("title", Value::from("Old"))])).unwrap();
        entity.set_value("title", "New");

        assert_eq!(entity.get("title"), Some(&Value::from("Old")));
        assert_eq!(entity.unsaved_data().get("title"), Some(&Value::from("New")));
        assert_eq!(entity.merged().get("title"), Some(&Value::from("New")));
        assert!(entity.is_dirty());

        entity.revert_unsaved_data();
        assert!(!entity.is_dirty());
        assert_eq!(entity.get("title"), Some(&Value::from("Old")));
    }

    #[test]
    fn set_and_set_values_stage_changes() {
        let mut entity = Entity::new(post_model());
        entity.set("title", "X");
        entity.set_values(row(&[("views", Value::Int(3)), ("other", Value::Null)]));

        assert!(entity.data().is_empty());
        assert_eq!(entity.unsaved_data().len(), 3);
        assert!(entity.get("title").is_none());
    }

    #[test]
    fn computed_values_are_readable() {
        let mut entity = Entity::new(post_model());
        entity.set_computed_value("score", 10i64);
        assert_eq!(entity.get("score"), Some(&Value::Int(10)));
        assert!(!entity.has("score"));

        assert!(!entity.to_map(false).contains_key("score"));
        assert_eq!(entity.to_map(true).get("score"), Some(&Value::Int(10)));
    }

    #[test]
    fn clear_resets_to_default() {
        let mut entity =
            Entity::from_row(post_model(), row(&[("views", Value::Int(9))])).unwrap();
        entity.clear("views").unwrap();
        assert_eq!(entity.get("views"), Some(&Value::Int(0)));

        let result = entity.clear("title");
        assert!(matches!(result, Err(Error::NoDefault(name)) if name == "title"));
    }

    #[test]
    fn commit_without_changes_is_noop() {
        let entity = Entity::new(post_model());
        assert_eq!(entity.commit(&store()).unwrap(), None);
    }

    #[test]
    fn commit_inserts_new_entity() {
        let store = store();
        let mut entity = Entity::new(post_model());
        entity.set_value("title", "Tom's <post>");
        entity.set_value("published", true);
        entity.set_value("tags", vec!["x", "y"]);

        let saved = entity.commit(&store).unwrap().unwrap();

        let stored = &store.rows("posts")[0];
        assert_eq!(
            stored.get("title"),
            Some(&Value::from("Tom&#039;s &lt;post&gt;"))
        );
        assert_eq!(stored.get("published"), Some(&Value::Int(1)));
        assert_eq!(stored.get("tags"), Some(&Value::from("x,y")));

        assert!(!saved.is_new());
        assert_eq!(saved.key(), Some(&Value::Int(1)));
        assert_eq!(saved.get("title"), Some(&Value::from("Tom's <post>")));
        assert_eq!(saved.get("tags"), Some(&Value::from(vec!["x", "y"])));

        // The original entity is untouched.
        assert!(entity.is_new());
        assert!(entity.is_dirty());
    }

    #[test]
    fn commit_updates_existing_entity() {
        let store = store();
        let model = post_model();
        let created = model
            .create_one(&store, row(&[("title", Value::from("First"))]))
            .unwrap()
            .unwrap();

        let mut entity = created.clone();
        entity.set_value("title", "Second");
        let updated = entity.commit(&store).unwrap().unwrap();

        assert_eq!(updated.key(), created.key());
        assert_eq!(updated.get("title"), Some(&Value::from("Second")));
        assert_eq!(store.count("posts"), 1);
    }

    #[test]
    fn commit_enforces_required_when_configured() {
        let model = Model::new(
            "posts",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::required("title", FieldType::String),
            ],
        )
        .with_config(crate::Config::default().with_enforce_required(true))
        .into_shared();

        let store = store();
        let mut entity = Entity::new(Arc::clone(&model));
        entity.set_value("id", 7i64);
        let result = entity.commit(&store);
        assert!(matches!(result, Err(Error::MissingRequiredField(name)) if name == "title"));
        assert_eq!(store.count("posts"), 0);
        assert!(entity.is_dirty());
    }

    struct FailingStore;

    impl QueryStore for FailingStore {
        fn insert(&self, _: &str, _: &Row) -> Result<Value> {
            Err(Error::Persistence("disk full".into()))
        }

        fn update(&self, _: &str, _: &Row, _: &str, _: &Value, _: usize) -> Result<u64> {
            Err(Error::MissingKey("posts".into()))
        }

        fn select(
            &self,
            _: &str,
            _: &Row,
            _: Option<usize>,
            _: Option<&OrderBy>,
        ) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }

        fn delete(&self, _: &str, _: &str, _: &Value, _: usize) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn store_failures_become_persistence_errors() {
        let mut entity = Entity::new(post_model());
        entity.set_value("title", "X");
        let result = entity.commit(&FailingStore);
        assert_eq!(result, Err(Error::Persistence("disk full".into())));

        let mut existing =
            Entity::from_row(post_model(), row(&[("id", Value::Int(1))])).unwrap();
        existing.set_value("title", "X");
        let result = existing.commit(&FailingStore);
        assert!(matches!(result, Err(Error::Persistence(msg)) if msg.contains("posts")));
    }

    #[test]
    fn commit_reports_missing_reload() {
        let store = store();
        let mut entity =
            Entity::from_row(post_model(), row(&[("id", Value::Int(42))])).unwrap();
        entity.set_value("title", "Ghost");
        let result = entity.commit(&store);
        assert!(matches!(
            result,
            Err(Error::RecordNotFound { table, key }) if table == "posts" && key == "42"
        ));
    }

    #[test]
    fn delete_requires_key() {
        let store = store();
        let entity = Entity::new(post_model());
        assert!(matches!(entity.delete(&store), Err(Error::MissingKey(_))));

        let saved = post_model()
            .create_one(&store, row(&[("title", Value::from("bye"))]))
            .unwrap()
            .unwrap();
        assert_eq!(saved.delete(&store).unwrap(), 1);
        assert_eq!(store.count("posts"), 0);
    }

    fn comment_model() -> Arc<Model> {
        Model::new(
            "comments",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::new("author", FieldType::Integer)
                    .with_populate(PopulateRule::Model("User".into())),
                FieldSchema::new("post", FieldType::Integer).with_populate(
                    PopulateRule::Target {
                        model: "Post".into(),
                        field: Some("parent".into()),
                    },
                ),
            ],
        )
        .into_shared()
    }

    fn user_model() -> Arc<Model> {
        Model::new(
            "users",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::new("name", FieldType::String),
            ],
        )
        .into_shared()
    }

    #[test]
    fn populate_resolves_foreign_entities() {
        let store = store();
        let users = user_model();
        let alice = users
            .create_one(&store, row(&[("name", Value::from("Alice"))]))
            .unwrap()
            .unwrap();

        let models = ModelRegistry::new()
            .with_model("User", Arc::clone(&users))
            .with_model("Post", post_model());

        let mut comment = Entity::from_row(
            comment_model(),
            row(&[
                ("id", Value::Int(1)),
                ("author", Value::Int(1)),
                ("post", Value::Int(99)),
            ]),
        )
        .unwrap();
        comment.populate(&store, &models, &[]).unwrap();

        let author = comment.get("_author").and_then(Value::as_entity).unwrap();
        assert_eq!(author, &alice);
        assert_eq!(author.get("name"), Some(&Value::from("Alice")));
        assert_eq!(comment.get("parent"), Some(&Value::Null));
        assert!(comment.data().get("_author").is_none());
    }

    #[test]
    fn populate_respects_field_filter() {
        let store = store();
        let models = ModelRegistry::new()
            .with_model("User", user_model())
            .with_model("Post", post_model());

        let mut comment =
            Entity::from_row(comment_model(), row(&[("author", Value::Int(1))])).unwrap();
        comment.populate(&store, &models, &["post"]).unwrap();

        assert!(comment.computed().get("_author").is_none());
        assert_eq!(comment.computed().get("parent"), Some(&Value::Null));
    }

    #[test]
    fn populate_unknown_model() {
        let store = store();
        let models = ModelRegistry::new().with_model("Post", post_model());
        let mut comment = Entity::new(comment_model());
        let result = comment.populate(&store, &models, &["author"]);
        assert!(matches!(result, Err(Error::ModelNotFound(name)) if name == "User"));
    }
}
