//! Model - the entity type descriptor.
//!
//! A [`Model`] names the table an entity type lives in, its primary key
//! field and the schema of every field. It owns the field transform used by
//! entities and exposes the query surface that hydrates rows into entities.

use crate::codec::{CodecRegistry, Direction};
use crate::store::{OrderBy, QueryStore};
use crate::{error::Result, transform, Collection, Config, Entity, Error, FieldDef, FieldSchema, Row, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Serializable model declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDef {
    pub table: String,
    #[serde(default = "default_key_field")]
    pub key_field: String,
    pub fields: Vec<FieldDef>,
}

fn default_key_field() -> String {
    "id".to_string()
}

/// Schema and storage location of an entity type.
#[derive(Debug)]
pub struct Model {
    table: String,
    key_field: String,
    fields: Vec<FieldSchema>,
    index: HashMap<String, usize>,
    codecs: Arc<CodecRegistry>,
    config: Config,
}

impl Model {
    /// Create a model keyed by `id`. A later field replaces an earlier one
    /// with the same name.
    pub fn new(table: impl Into<String>, fields: Vec<FieldSchema>) -> Self {
        let mut model = Self {
            table: table.into(),
            key_field: default_key_field(),
            fields: Vec::with_capacity(fields.len()),
            index: HashMap::new(),
            codecs: CodecRegistry::shared(),
            config: Config::default(),
        };
        for field in fields {
            match model.index.get(&field.name) {
                Some(&i) => model.fields[i] = field,
                None => {
                    model.index.insert(field.name.clone(), model.fields.len());
                    model.fields.push(field);
                }
            }
        }
        model
    }

    /// Build a model from its serializable declaration.
    pub fn from_def(def: ModelDef) -> Result<Self> {
        if def.table.is_empty() {
            return Err(Error::InvalidModelDef("table name must not be empty".into()));
        }
        let mut fields = Vec::with_capacity(def.fields.len());
        for field in def.fields {
            let field = field.into_schema()?;
            if fields.iter().any(|f: &FieldSchema| f.name == field.name) {
                return Err(Error::InvalidModelDef(format!(
                    "duplicate field '{}'",
                    field.name
                )));
            }
            fields.push(field);
        }
        Ok(Self::new(def.table, fields).with_key_field(def.key_field))
    }

    /// Parse a JSON model declaration.
    pub fn from_json(json: &str) -> Result<Self> {
        let def: ModelDef =
            serde_json::from_str(json).map_err(|e| Error::InvalidModelDef(e.to_string()))?;
        Self::from_def(def)
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    /// Resolve `custom` field types through `codecs`.
    pub fn with_codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Freeze the model so entities can share it.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    /// Field schemas in declaration order.
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Convert one field value between its storage and in-memory forms.
    ///
    /// With `use_default`, `value` is replaced by the field default first
    /// ([`Error::NoDefault`] if there is none). Fields missing from the
    /// schema pass through unchanged.
    pub fn transform(
        &self,
        name: &str,
        value: Value,
        direction: Direction,
        use_default: bool,
    ) -> Result<Value> {
        let Some(field) = self.field(name) else {
            if use_default {
                return Err(Error::NoDefault(name.to_string()));
            }
            return Ok(value);
        };

        let value = if use_default {
            field
                .default
                .clone()
                .ok_or_else(|| Error::NoDefault(name.to_string()))?
        } else {
            value
        };

        transform::apply(
            field,
            value,
            direction,
            &self.codecs,
            &self.config.datetime_format,
        )
    }

    /// Check required fields against an encoded change set.
    ///
    /// Inserts must carry every required field except the primary key;
    /// updates must not null out a required field.
    pub(crate) fn check_required(&self, changes: &Row, inserting: bool) -> Result<()> {
        for field in self.fields.iter().filter(|f| f.required) {
            let missing = match changes.get(&field.name) {
                Some(value) => value.is_null(),
                None => inserting && field.name != self.key_field,
            };
            if missing {
                return Err(Error::MissingRequiredField(field.name.clone()));
            }
        }
        Ok(())
    }

    /// Hydrate raw rows into a collection of entities of this model.
    pub fn hydrate(self: &Arc<Self>, rows: Vec<Row>) -> Result<Collection> {
        rows.into_iter()
            .map(|row| Entity::from_row(Arc::clone(self), row))
            .collect()
    }

    /// Select rows matching `criteria`.
    pub fn select_by_criteria(
        self: &Arc<Self>,
        store: &dyn QueryStore,
        criteria: &Row,
        limit: Option<usize>,
        order_by: Option<&OrderBy>,
    ) -> Result<Collection> {
        let rows = store
            .select(&self.table, criteria, limit, order_by)
            .map_err(into_persistence)?;
        self.hydrate(rows)
    }

    /// Select the row whose primary key equals `key`.
    pub fn select_by_key(self: &Arc<Self>, store: &dyn QueryStore, key: &Value) -> Result<Collection> {
        let mut criteria = Row::new();
        criteria.insert(self.key_field.clone(), key.clone());
        self.select_by_criteria(store, &criteria, Some(1), None)
    }

    /// Select at most one row matching `criteria`.
    pub fn get_one(self: &Arc<Self>, store: &dyn QueryStore, criteria: &Row) -> Result<Collection> {
        self.select_by_criteria(store, criteria, Some(1), None)
    }

    /// Select every row of the table.
    pub fn get_all(
        self: &Arc<Self>,
        store: &dyn QueryStore,
        order_by: Option<&OrderBy>,
    ) -> Result<Collection> {
        self.select_by_criteria(store, &Row::new(), None, order_by)
    }

    /// Create, commit and reload a new entity in one step.
    ///
    /// Returns `Ok(None)` when `fields` is empty.
    pub fn create_one(self: &Arc<Self>, store: &dyn QueryStore, fields: Row) -> Result<Option<Entity>> {
        if fields.is_empty() {
            return Ok(None);
        }
        let mut entity = Entity::new(Arc::clone(self));
        entity.set_values(fields);
        entity.commit(store)
    }
}

/// Store failures surface as [`Error::Persistence`].
pub(crate) fn into_persistence(err: Error) -> Error {
    match err {
        Error::Persistence(_) => err,
        other => Error::Persistence(other.to_string()),
    }
}

/// Models addressable by name, used to resolve `populate` rules.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` under `name`, returning any model it replaces.
    pub fn register(&mut self, name: impl Into<String>, model: Arc<Model>) -> Option<Arc<Model>> {
        self.models.insert(name.into(), model)
    }

    /// Builder-style method to register a model.
    pub fn with_model(mut self, name: impl Into<String>, model: Arc<Model>) -> Self {
        self.register(name, model);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Arc<Model>> {
        self.models
            .get(name)
            .ok_or_else(|| Error::ModelNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FieldType, MemoryStore};

    fn posts() -> Arc<Model> {
        Model::new(
            "posts",
            vec![
                FieldSchema::new("id", FieldType::Integer),
                FieldSchema::required("title", FieldType::String),
                FieldSchema::new("views", FieldType::Integer).with_default(0),
            ],
        )
        .into_shared()
    }

    #[test]
    fn transform_unknown_field_passes_through() {
        let model = posts();
        let value = model
            .transform("other", Value::from("x"), Direction::Decode, false)
            .unwrap();
        assert_eq!(value, Value::from("x"));

        let result = model.transform("other", Value::Null, Direction::Decode, true);
        assert!(matches!(result, Err(Error::NoDefault(name)) if name == "other"));
    }

    #[test]
    fn transform_with_default() {
        let model = posts();
        let value = model
            .transform("views", Value::from("99"), Direction::Decode, true)
            .unwrap();
        assert_eq!(value, Value::Int(0));

        let result = model.transform("title", Value::Null, Direction::Decode, true);
        assert!(matches!(result, Err(Error::NoDefault(name)) if name == "title"));
    }

    #[test]
    fn duplicate_fields_replace() {
        let model = Model::new(
            "t",
            vec![
                FieldSchema::new("a", FieldType::Integer),
                FieldSchema::new("a", FieldType::Money),
            ],
        );
        assert_eq!(model.fields().len(), 1);
        assert_eq!(model.field("a").unwrap().field_type, FieldType::Money);
    }

    #[test]
    fn model_from_json() {
        let model = Model::from_json(
            r#"{
                "table": "comments",
                "keyField": "comment_id",
                "fields": [
                    {"name": "comment_id", "type": "integer"},
                    {"name": "post", "type": "integer", "populate": "Post"},
                    {"name": "body", "type": "string", "required": true}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(model.table(), "comments");
        assert_eq!(model.key_field(), "comment_id");
        assert_eq!(model.fields().len(), 3);
        assert!(model.field("body").unwrap().required);
    }

    #[test]
    fn model_def_rejects_duplicates() {
        let result = Model::from_json(
            r#"{"table": "t", "fields": [{"name": "a"}, {"name": "a"}]}"#,
        );
        assert!(matches!(result, Err(Error::InvalidModelDef(_))));

        let result = Model::from_json(r#"{"table": "", "fields": []}"#);
        assert!(matches!(result, Err(Error::InvalidModelDef(_))));

        let result = Model::from_json("not json");
        assert!(matches!(result, Err(Error::InvalidModelDef(_))));
    }

    #[test]
    fn check_required_on_insert_and_update() {
        let model = posts();
        let mut changes = Row::new();
        changes.insert("views".into(), Value::Int(1));

        assert!(matches!(
            model.check_required(&changes, true),
            Err(Error::MissingRequiredField(name)) if name == "title"
        ));
        assert!(model.check_required(&changes, false).is_ok());

        changes.insert("title".into(), Value::Null);
        assert!(model.check_required(&changes, false).is_err());
    }

    #[test]
    fn query_surface() {
        let model = posts();
        let store = MemoryStore::new().with_table("posts", "id");
        for title in ["a", "b", "c"] {
            let mut row = Row::new();
            row.insert("title".into(), Value::from(title));
            model.create_one(&store, row).unwrap();
        }

        let found = model.select_by_key(&store, &Value::Int(2)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.get(0).unwrap().get("title"), Some(&Value::from("b")));

        let all = model.get_all(&store, Some(&OrderBy::desc("id"))).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.get(0).unwrap().key(), Some(&Value::Int(3)));

        let mut criteria = Row::new();
        criteria.insert("title".into(), Value::from("c"));
        let one = model.get_one(&store, &criteria).unwrap();
        assert_eq!(one.first().unwrap().key(), Some(&Value::Int(3)));

        assert!(model.create_one(&store, Row::new()).unwrap().is_none());
    }

    #[test]
    fn model_registry_lookup() {
        let registry = ModelRegistry::new().with_model("Post", posts());
        assert!(registry.contains("Post"));
        assert_eq!(registry.get("Post").unwrap().table(), "posts");
        assert!(matches!(registry.get("User"), Err(Error::ModelNotFound(name)) if name == "User"));
    }
}
