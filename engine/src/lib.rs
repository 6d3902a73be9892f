//! # Rowmap Engine
//!
//! A lightweight mapping layer between database rows and in-memory entities.
//!
//! This crate turns raw rows into typed entities, tracks field-level changes
//! and converts values back to their storage representation when changes are
//! committed. It does not build SQL or manage connections: all reads and
//! writes go through a [`QueryStore`] supplied by the application.
//!
//! ## Core Concepts
//!
//! ### Models and Field Schemas
//!
//! A [`Model`] describes an entity type: its table, primary key field and a
//! [`FieldSchema`] per field. Each field has a [`FieldType`] that decides how
//! values are decoded when a row is loaded and encoded when a change is
//! written:
//!
//! - `integer`, `money`, `boolean`, `string`, `set`, `json`, `enum`
//! - `datetime` / `timestamp` (UTC, `YYYY-MM-DD HH:MM:SS` in storage)
//! - `custom(name)` - resolved through a [`CodecRegistry`]
//!
//! ### Entities
//!
//! An [`Entity`] holds current values (decoded at load time), pending
//! changes (staged with [`Entity::set_value`]) and computed values (never
//! persisted, e.g. foreign entities resolved by [`Entity::populate`]).
//! [`Entity::commit`] encodes the pending changes, inserts or updates the row
//! and returns a freshly reloaded entity.
//!
//! ### Collections
//!
//! A [`Collection`] is an ordered list of entities with a read cursor,
//! conversion to plain rows and field extraction.
//!
//! ## Quick Start
//!
//! ```rust
//! use rowmap_engine::{Entity, FieldSchema, FieldType, MemoryStore, Model, Value};
//! use std::sync::Arc;
//!
//! // 1. Describe the entity type
//! let posts = Model::new(
//!     "posts",
//!     vec![
//!         FieldSchema::new("id", FieldType::Integer),
//!         FieldSchema::new("title", FieldType::String),
//!         FieldSchema::new("tags", FieldType::Set),
//!     ],
//! )
//! .into_shared();
//!
//! // 2. Pick a store (any QueryStore implementation)
//! let store = MemoryStore::new().with_table("posts", "id");
//!
//! // 3. Stage changes and commit
//! let mut post = Entity::new(Arc::clone(&posts));
//! post.set_value("title", "Hello");
//! post.set_value("tags", vec!["rust", "orm"]);
//!
//! let saved = post.commit(&store).unwrap().unwrap();
//! assert_eq!(saved.key(), Some(&Value::Int(1)));
//! assert_eq!(saved.get("tags"), Some(&Value::from(vec!["rust", "orm"])));
//!
//! // 4. Query
//! let mut all = posts.get_all(&store, None).unwrap();
//! assert_eq!(all.len(), 1);
//! assert_eq!(all.next(false).unwrap().get("title"), Some(&Value::from("Hello")));
//! ```
//!
//! ## Logging
//!
//! The engine emits [`tracing`] events (commits, store writes, registry
//! changes, lossy decodes). It never installs a subscriber.

pub mod codec;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod model;
pub mod schema;
pub mod store;
mod transform;
pub mod value;

// Re-export main types at crate root
pub use codec::{Codec, CodecRegistry, Direction, FnCodec};
pub use collection::{Collection, Extracted};
pub use config::{Config, ConfigError};
pub use entity::Entity;
pub use error::Error;
pub use model::{Model, ModelDef, ModelRegistry};
pub use schema::{FieldDef, FieldSchema, FieldType, PopulateRule, TransformFn};
pub use store::{MemoryStore, OrderBy, QueryStore};
pub use value::{row_from_json, Row, Value};
