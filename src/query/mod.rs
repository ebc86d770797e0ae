//! Query values and the specification composer
//!
//! A [`Query`] is an inert description handed to the storage engine. It is
//! built from relation scopes (added by resolvers) and the modifiers of a
//! [`QuerySpec`] (eager-load, sort, filter). Pagination windows are applied
//! last by the pagination engines.

mod filter;
mod spec;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;

pub use filter::{Filter, compare, lookup, sort_key};
pub use spec::{EagerLoadSet, FnModifier, QueryModifier, QuerySpec, SortSet, compose};

use crate::entity::Entity;
use crate::error::Result;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

/// One sort clause
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: Direction,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
        }
    }
}

/// Eager-load of an association stored in another schema
///
/// For each row, rows of `schema` whose `foreign_field` equals the row's
/// `local_field` are embedded under `name` as an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EagerLoad {
    pub name: String,
    pub schema: String,
    pub local_field: String,
    pub foreign_field: String,
}

impl EagerLoad {
    /// Children of `C` that point back at a `P` row through `foreign_key`
    pub fn children<P: Entity, C: Entity>(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema: C::SCHEMA.to_string(),
            local_field: P::ID_FIELD.to_string(),
            foreign_field: foreign_key.into(),
        }
    }

    /// Parent `P` referenced by this row's `foreign_key`
    pub fn parent<P: Entity>(name: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: P::SCHEMA.to_string(),
            local_field: foreign_key.into(),
            foreign_field: P::ID_FIELD.to_string(),
        }
    }
}

/// Description of a read against entity type `E`
pub struct Query<E> {
    scopes: Vec<Filter>,
    eager_loads: Vec<EagerLoad>,
    sorts: Vec<Sort>,
    filter: Filter,
    offset: u64,
    limit: Option<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Query<E> {
    /// Query over every row of `E`
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            eager_loads: Vec::new(),
            sorts: Vec::new(),
            filter: Filter::True,
            offset: 0,
            limit: None,
            _entity: PhantomData,
        }
    }

    /// Query for the row with identifier `id`
    pub fn by_id(id: &E::Id) -> Result<Self> {
        Ok(Self::new().scope(Filter::eq(E::ID_FIELD, id_value::<E>(id)?)))
    }

    /// Restrict rows by a relation scope
    pub fn scope(mut self, filter: Filter) -> Self {
        self.scopes.push(filter);
        self
    }

    /// Embed an association
    pub fn with(mut self, eager: EagerLoad) -> Self {
        if !self.eager_loads.iter().any(|e| e.name == eager.name) {
            self.eager_loads.push(eager);
        }
        self
    }

    /// Append a sort clause
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sorts.push(sort);
        self
    }

    /// Add a filter predicate (AND-ed with existing filters)
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = std::mem::replace(&mut self.filter, Filter::True).and(filter);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Same query without the pagination window
    pub fn unbounded(&self) -> Self {
        let mut query = self.clone();
        query.offset = 0;
        query.limit = None;
        query
    }

    pub fn scopes(&self) -> &[Filter] {
        &self.scopes
    }

    pub fn eager_loads(&self) -> &[EagerLoad] {
        &self.eager_loads
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn filter_predicate(&self) -> &Filter {
        &self.filter
    }

    pub fn window(&self) -> (u64, Option<u64>) {
        (self.offset, self.limit)
    }

    /// Scopes and filter combined into one predicate
    pub fn predicate(&self) -> Filter {
        self.scopes
            .iter()
            .cloned()
            .fold(Filter::True, Filter::and)
            .and(self.filter.clone())
    }
}

impl<E: Entity> Default for Query<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for Query<E> {
    fn clone(&self) -> Self {
        Self {
            scopes: self.scopes.clone(),
            eager_loads: self.eager_loads.clone(),
            sorts: self.sorts.clone(),
            filter: self.filter.clone(),
            offset: self.offset,
            limit: self.limit,
            _entity: PhantomData,
        }
    }
}

impl<E> fmt::Debug for Query<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("entity", &std::any::type_name::<E>())
            .field("scopes", &self.scopes)
            .field("eager_loads", &self.eager_loads)
            .field("sorts", &self.sorts)
            .field("filter", &self.filter)
            .field("offset", &self.offset)
            .field("limit", &self.limit)
            .finish()
    }
}

/// JSON form of an identifier, as stored in rows and foreign keys
pub fn id_value<E: Entity>(id: &E::Id) -> Result<Value> {
    Ok(serde_json::to_value(id)?)
}
