//! Named field type codecs.
//!
//! A [`CodecRegistry`] maps a type name to an encode/decode pair. Fields
//! declared as [`FieldType::Custom`](crate::FieldType::Custom) are
//! transformed through the registry entry of the same name, which lets
//! applications add field types beyond the built-in set at runtime.
//!
//! The registry is an ordinary value: build one, register codecs during
//! startup and share it between models through an `Arc`. Registration is
//! write-once per name and lookups take a read lock, so a registry can be
//! shared across threads.

use crate::{error::Result, Error, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Which way a value is being transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Storage representation to in-memory value (loading a row)
    Decode,
    /// In-memory value to storage representation (preparing a write)
    Encode,
}

/// An encode/decode pair for one field type.
pub trait Codec: Send + Sync {
    /// Convert an in-memory value to its storage representation.
    fn encode(&self, value: Value) -> Result<Value>;

    /// Convert a storage representation to its in-memory value.
    fn decode(&self, value: Value) -> Result<Value>;

    /// Dispatch on `direction`.
    fn apply(&self, value: Value, direction: Direction) -> Result<Value> {
        match direction {
            Direction::Encode => self.encode(value),
            Direction::Decode => self.decode(value),
        }
    }
}

/// A codec built from two closures.
pub struct FnCodec<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnCodec<E, D>
where
    E: Fn(Value) -> Result<Value> + Send + Sync,
    D: Fn(Value) -> Result<Value> + Send + Sync,
{
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<E, D> Codec for FnCodec<E, D>
where
    E: Fn(Value) -> Result<Value> + Send + Sync,
    D: Fn(Value) -> Result<Value> + Send + Sync,
{
    fn encode(&self, value: Value) -> Result<Value> {
        (self.encode)(value)
    }

    fn decode(&self, value: Value) -> Result<Value> {
        (self.decode)(value)
    }
}

/// Registry of named codecs.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: RwLock<HashMap<String, Arc<dyn Codec>>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry ready to be shared between models.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a codec under `name`.
    ///
    /// Fails with [`Error::DuplicateType`] if the name is taken; the codec
    /// already registered stays in place.
    pub fn register<C>(&self, name: impl Into<String>, codec: C) -> Result<()>
    where
        C: Codec + 'static,
    {
        self.register_arc(name, Arc::new(codec))
    }

    /// Register an already shared codec under `name`.
    pub fn register_arc(&self, name: impl Into<String>, codec: Arc<dyn Codec>) -> Result<()> {
        let name = name.into();
        let mut codecs = self.codecs.write();
        if codecs.contains_key(&name) {
            tracing::warn!(field_type = %name, "field type already registered");
            return Err(Error::DuplicateType(name));
        }
        tracing::debug!(field_type = %name, "registered field type");
        codecs.insert(name, codec);
        Ok(())
    }

    /// Remove a codec, returning it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.write().remove(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.codecs.read().contains_key(name)
    }

    /// Look up a codec by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Codec>> {
        self.codecs
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::CodecNotFound(name.to_string()))
    }

    /// Encode or decode `value` with the codec registered as `name`.
    pub fn execute(&self, name: &str, value: Value, direction: Direction) -> Result<Value> {
        // The lock is released before the codec runs.
        let codec = self.get(name)?;
        codec.apply(value, direction)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.codecs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.codecs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("types", &self.names())
            .finish()
    }
}
