//! In-memory storage engine
//!
//! Rows are kept as JSON documents per schema. A transaction holds the
//! engine lock for its whole lifetime and works on a copy of the tables, so
//! transactions are fully serialized: commit swaps the copy in, rollback (or
//! drop) throws it away.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use super::traits::{Database, Transaction};
use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use crate::query::{Direction, EagerLoad, Query, compare, id_value, sort_key};

#[derive(Clone, Debug, Default)]
struct Table {
    rows: Vec<Value>,
    sequence: u64,
}

#[derive(Clone, Debug, Default)]
struct Tables {
    tables: HashMap<String, Table>,
}

impl Tables {
    fn rows(&self, schema: &str) -> &[Value] {
        self.tables
            .get(schema)
            .map(|t| t.rows.as_slice())
            .unwrap_or(&[])
    }
}

/// Unique constraints: schema -> list of field groups
type Constraints = HashMap<String, Vec<Vec<String>>>;

/// In-memory storage engine
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    state: Arc<Mutex<Tables>>,
    constraints: Arc<Constraints>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unique constraint over `fields` of `schema`
    ///
    /// Must be called before the database is shared.
    pub fn with_unique(mut self, schema: &str, fields: &[&str]) -> Self {
        Arc::make_mut(&mut self.constraints)
            .entry(schema.to_string())
            .or_default()
            .push(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Committed rows of a schema, in insertion order
    pub async fn rows(&self, schema: &str) -> Vec<Value> {
        self.state.lock().await.rows(schema).to_vec()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        tracing::trace!("memory transaction started");
        Ok(MemoryTransaction {
            guard: Some(guard),
            working,
            constraints: self.constraints.clone(),
            writes: 0,
        })
    }
}

/// Transaction over a [`MemoryDatabase`]
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<Tables>>,
    working: Tables,
    constraints: Arc<Constraints>,
    writes: usize,
}

impl MemoryTransaction {
    fn embed(&self, mut row: Value, eager_loads: &[EagerLoad]) -> Value {
        for eager in eager_loads {
            let local = sort_key(&row, &eager.local_field);
            let related: Vec<Value> = if local.is_null() {
                Vec::new()
            } else {
                self.working
                    .rows(&eager.schema)
                    .iter()
                    .filter(|candidate| compare(&sort_key(candidate, &eager.foreign_field), &local).is_eq())
                    .cloned()
                    .collect()
            };
            if let Value::Object(map) = &mut row {
                map.insert(eager.name.clone(), Value::Array(related));
            }
        }
        row
    }

    fn matching_rows<E: Entity>(&self, query: &Query<E>) -> Vec<Value> {
        let predicate = query.predicate();
        let mut rows: Vec<Value> = self
            .working
            .rows(E::SCHEMA)
            .iter()
            .map(|row| self.embed(row.clone(), query.eager_loads()))
            .filter(|row| predicate.matches(row))
            .collect();

        let sorts = query.sorts();
        if !sorts.is_empty() {
            rows.sort_by(|a, b| {
                for sort in sorts {
                    let ord = compare(&sort_key(a, &sort.field), &sort_key(b, &sort.field));
                    let ord = match sort.direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        rows
    }

    fn check_unique(&self, schema: &str, id_field: &str, id: &Value, row: &Value) -> Result<()> {
        let Some(groups) = self.constraints.get(schema) else {
            return Ok(());
        };
        for fields in groups {
            let key: Vec<Value> = fields.iter().map(|f| sort_key(row, f)).collect();
            if key.iter().any(Value::is_null) {
                continue;
            }
            let duplicate = self.working.rows(schema).iter().any(|other| {
                !compare(&sort_key(other, id_field), id).is_eq()
                    && fields
                        .iter()
                        .zip(&key)
                        .all(|(f, v)| compare(&sort_key(other, f), v).is_eq())
            });
            if duplicate {
                return Err(Error::conflict(format!(
                    "duplicate {} for unique ({})",
                    schema,
                    fields.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Option<OwnedMutexGuard<Tables>> {
        self.guard.take()
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn fetch<E: Entity>(&mut self, query: &Query<E>) -> Result<Vec<E>> {
        let (offset, limit) = query.window();
        let rows = self.matching_rows(query);
        let window = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit.map_or(usize::MAX, |l| l as usize));
        let mut entities = Vec::new();
        for row in window {
            entities.push(serde_json::from_value(row)?);
        }
        Ok(entities)
    }

    async fn count<E: Entity>(&mut self, query: &Query<E>) -> Result<u64> {
        Ok(self.matching_rows(query).len() as u64)
    }

    async fn save<E: Entity>(&mut self, entity: &mut E) -> Result<()> {
        if entity.id().is_none() {
            let table = self.working.tables.entry(E::SCHEMA.to_string()).or_default();
            table.sequence += 1;
            entity.set_id(E::Id::from_sequence(table.sequence));
        }
        let id = id_value::<E>(&entity.require_id()?)?;
        // caller-chosen numeric ids move the sequence past them
        if let Some(n) = id.as_u64() {
            let table = self.working.tables.entry(E::SCHEMA.to_string()).or_default();
            table.sequence = table.sequence.max(n);
        }

        let mut row = serde_json::to_value(&*entity)?;
        if let Value::Object(map) = &mut row {
            for association in E::ASSOCIATIONS {
                map.remove(*association);
            }
        }
        self.check_unique(E::SCHEMA, E::ID_FIELD, &id, &row)?;

        let table = self.working.tables.entry(E::SCHEMA.to_string()).or_default();
        match table
            .rows
            .iter()
            .position(|existing| compare(&sort_key(existing, E::ID_FIELD), &id).is_eq())
        {
            Some(index) => table.rows[index] = row,
            None => table.rows.push(row),
        }
        self.writes += 1;
        Ok(())
    }

    async fn delete<E: Entity>(&mut self, id: &E::Id) -> Result<bool> {
        let id = id_value::<E>(id)?;
        let Some(table) = self.working.tables.get_mut(E::SCHEMA) else {
            return Ok(false);
        };
        let before = table.rows.len();
        table
            .rows
            .retain(|row| !compare(&sort_key(row, E::ID_FIELD), &id).is_eq());
        let removed = table.rows.len() != before;
        if removed {
            self.writes += 1;
        }
        Ok(removed)
    }

    #[instrument(level = "debug", skip_all)]
    async fn commit(mut self) -> Result<()> {
        let working = std::mem::take(&mut self.working);
        if let Some(mut guard) = self.finalize() {
            *guard = working;
        }
        tracing::debug!(writes = self.writes, "memory transaction committed");
        Ok(())
    }

    #[instrument(level = "debug", skip_all)]
    async fn rollback(mut self) -> Result<()> {
        self.finalize();
        tracing::debug!(writes = self.writes, "memory transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.guard.is_some() && self.writes > 0 {
            tracing::warn!(
                writes = self.writes,
                "MemoryTransaction dropped without commit/rollback, discarding writes"
            );
        }
    }
}
