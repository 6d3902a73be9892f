//! Query store - the persistence collaborator.
//!
//! Entities never talk to a database directly. Writes and lookups go
//! through a [`QueryStore`], which the application implements on top of its
//! driver. Stores receive encoded values and return raw rows; hydrating
//! rows into entities is done by [`Model`](crate::Model).
//!
//! [`MemoryStore`] is an in-memory implementation with auto-increment keys,
//! useful for tests and prototyping.

use crate::value::loose_eq;
use crate::{error::Result, Error, Row, Value};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Sort order for a select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Synchronous query capability supplied by the application.
///
/// Implementations report driver failures as [`Error::Persistence`].
pub trait QueryStore {
    /// Insert a row and return its primary key.
    fn insert(&self, table: &str, values: &Row) -> Result<Value>;

    /// Update at most `limit` rows whose `key_field` equals `key`.
    /// Returns the number of rows changed.
    fn update(
        &self,
        table: &str,
        values: &Row,
        key_field: &str,
        key: &Value,
        limit: usize,
    ) -> Result<u64>;

    /// Select rows matching every `criteria` entry (equality).
    fn select(
        &self,
        table: &str,
        criteria: &Row,
        limit: Option<usize>,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Row>>;

    /// Delete at most `limit` rows whose `key_field` equals `key`.
    /// Returns the number of rows removed.
    fn delete(&self, table: &str, key_field: &str, key: &Value, limit: usize) -> Result<u64>;
}

/// A table of rows.
#[derive(Debug, Clone)]
struct Table {
    key_field: String,
    rows: Vec<Row>,
    /// Next auto-increment key; `None` once the key space is used up
    next_id: Option<i64>,
}

impl Table {
    fn new(key_field: impl Into<String>) -> Self {
        Self {
            key_field: key_field.into(),
            rows: Vec::new(),
            next_id: Some(1),
        }
    }

    fn contains_key(&self, key: &Value) -> bool {
        self.rows
            .iter()
            .any(|row| row.get(&self.key_field).is_some_and(|v| loose_eq(v, key)))
    }

    fn matches(row: &Row, criteria: &Row) -> bool {
        criteria.iter().all(|(field, expected)| {
            let actual = row.get(field).unwrap_or(&Value::Null);
            if expected.is_null() {
                actual.is_null()
            } else {
                loose_eq(actual, expected)
            }
        })
    }
}

/// In-memory query store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table keyed by `key_field`. Existing tables are kept.
    pub fn create_table(&self, table: impl Into<String>, key_field: impl Into<String>) {
        self.tables
            .lock()
            .entry(table.into())
            .or_insert_with(|| Table::new(key_field));
    }

    /// Builder-style method to add a table.
    pub fn with_table(self, table: impl Into<String>, key_field: impl Into<String>) -> Self {
        self.create_table(table, key_field);
        self
    }

    /// Snapshot of every row stored in `table`, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> usize {
        self.tables.lock().get(table).map_or(0, |t| t.rows.len())
    }
}

fn no_such_table(table: &str) -> Error {
    Error::persistence(format_args!("no such table: {table}"))
}

fn compare(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.render().cmp(&b.render()),
        },
    }
}

impl QueryStore for MemoryStore {
    fn insert(&self, table: &str, values: &Row) -> Result<Value> {
        let mut tables = self.tables.lock();
        let t = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;

        let mut row = values.clone();
        let key = match row.get(&t.key_field) {
            Some(key) if !key.is_null() => {
                if t.contains_key(key) {
                    return Err(Error::persistence(format_args!(
                        "duplicate key {key} in {table}"
                    )));
                }
                if let Value::Int(id) = key {
                    if t.next_id.is_some_and(|next| *id >= next) {
                        t.next_id = id.checked_add(1);
                    }
                }
                key.clone()
            }
            _ => {
                let id = t.next_id.ok_or_else(|| {
                    Error::persistence(format_args!("key space exhausted in {table}"))
                })?;
                t.next_id = id.checked_add(1);
                let key = Value::Int(id);
                row.insert(t.key_field.clone(), key.clone());
                key
            }
        };

        tracing::debug!(table, key = %key, "inserted row");
        t.rows.push(row);
        Ok(key)
    }

    fn update(
        &self,
        table: &str,
        values: &Row,
        key_field: &str,
        key: &Value,
        limit: usize,
    ) -> Result<u64> {
        let mut tables = self.tables.lock();
        let t = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;

        let mut changed = 0;
        for row in t
            .rows
            .iter_mut()
            .filter(|row| row.get(key_field).is_some_and(|v| loose_eq(v, key)))
            .take(limit)
        {
            for (field, value) in values {
                row.insert(field.clone(), value.clone());
            }
            changed += 1;
        }

        tracing::debug!(table, key = %key, changed, "updated rows");
        Ok(changed)
    }

    fn select(
        &self,
        table: &str,
        criteria: &Row,
        limit: Option<usize>,
        order_by: Option<&OrderBy>,
    ) -> Result<Vec<Row>> {
        let tables = self.tables.lock();
        let t = tables.get(table).ok_or_else(|| no_such_table(table))?;

        let mut rows: Vec<Row> = t
            .rows
            .iter()
            .filter(|row| Table::matches(row, criteria))
            .cloned()
            .collect();

        if let Some(order) = order_by {
            rows.sort_by(|a, b| {
                let ordering = compare(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        if let Some(limit) = limit.filter(|l| *l > 0) {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    fn delete(&self, table: &str, key_field: &str, key: &Value, limit: usize) -> Result<u64> {
        let mut tables = self.tables.lock();
        let t = tables.get_mut(table).ok_or_else(|| no_such_table(table))?;

        let mut removed = 0u64;
        t.rows.retain(|row| {
            let hit = (removed as usize) < limit
                && row.get(key_field).is_some_and(|v| loose_eq(v, key));
            if hit {
                removed += 1;
            }
            !hit
        });

        tracing::debug!(table, key = %key, removed, "deleted rows");
        Ok(removed)
    }
}
