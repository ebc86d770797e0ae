//! Query specification composer
//!
//! Each modifier is a pure `Query -> Query` transform. Composition order is
//! fixed: eager-load, then sort, then filter, so sort and filter clauses may
//! reference eager-loaded associations. An absent modifier is the identity.

use std::fmt;
use std::sync::Arc;

use super::{EagerLoad, Filter, Query, Sort};
use crate::entity::Entity;

/// A pure transform over a query
pub trait QueryModifier<E>: Send + Sync {
    fn apply(&self, query: Query<E>) -> Query<E>;
}

/// Ordered set of eager loads
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EagerLoadSet(pub Vec<EagerLoad>);

impl EagerLoadSet {
    pub fn new(loads: impl IntoIterator<Item = EagerLoad>) -> Self {
        Self(loads.into_iter().collect())
    }
}

impl<E: Entity> QueryModifier<E> for EagerLoadSet {
    fn apply(&self, query: Query<E>) -> Query<E> {
        self.0.iter().cloned().fold(query, Query::with)
    }
}

/// Ordered list of sort clauses
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortSet(pub Vec<Sort>);

impl SortSet {
    pub fn new(sorts: impl IntoIterator<Item = Sort>) -> Self {
        Self(sorts.into_iter().collect())
    }

    /// Parse `"title,-id"` style sort parameters (`-` prefix = descending)
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| match part.strip_prefix('-') {
                    Some(field) => Sort::desc(field),
                    None => Sort::asc(part.trim_start_matches('+')),
                })
                .collect(),
        )
    }
}

impl<E: Entity> QueryModifier<E> for SortSet {
    fn apply(&self, query: Query<E>) -> Query<E> {
        self.0.iter().cloned().fold(query, Query::sort)
    }
}

impl<E: Entity> QueryModifier<E> for Filter {
    fn apply(&self, query: Query<E>) -> Query<E> {
        query.filter(self.clone())
    }
}

/// Adapter turning a closure into a modifier
pub struct FnModifier<F>(pub F);

impl<E, F> QueryModifier<E> for FnModifier<F>
where
    F: Fn(Query<E>) -> Query<E> + Send + Sync,
{
    fn apply(&self, query: Query<E>) -> Query<E> {
        (self.0)(query)
    }
}

/// Apply the optional modifiers to `base` in eager-load, sort, filter order
pub fn compose<E>(
    base: Query<E>,
    eager_load: Option<&dyn QueryModifier<E>>,
    sort: Option<&dyn QueryModifier<E>>,
    filter: Option<&dyn QueryModifier<E>>,
) -> Query<E> {
    [eager_load, sort, filter]
        .into_iter()
        .flatten()
        .fold(base, |query, modifier| modifier.apply(query))
}

/// Reusable bundle of modifiers bound to one endpoint
pub struct QuerySpec<E> {
    eager_load: Option<Arc<dyn QueryModifier<E>>>,
    sort: Option<Arc<dyn QueryModifier<E>>>,
    filter: Option<Arc<dyn QueryModifier<E>>>,
}

impl<E: Entity> QuerySpec<E> {
    /// Specification with no modifiers (the identity transform)
    pub fn new() -> Self {
        Self {
            eager_load: None,
            sort: None,
            filter: None,
        }
    }

    pub fn eager_load(mut self, modifier: impl QueryModifier<E> + 'static) -> Self {
        self.eager_load = Some(Arc::new(modifier));
        self
    }

    pub fn sort(mut self, modifier: impl QueryModifier<E> + 'static) -> Self {
        self.sort = Some(Arc::new(modifier));
        self
    }

    pub fn filter(mut self, modifier: impl QueryModifier<E> + 'static) -> Self {
        self.filter = Some(Arc::new(modifier));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.eager_load.is_none() && self.sort.is_none() && self.filter.is_none()
    }

    pub fn compose(&self, base: Query<E>) -> Query<E> {
        compose(
            base,
            self.eager_load.as_deref(),
            self.sort.as_deref(),
            self.filter.as_deref(),
        )
    }
}

impl<E: Entity> Default for QuerySpec<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for QuerySpec<E> {
    fn clone(&self) -> Self {
        Self {
            eager_load: self.eager_load.clone(),
            sort: self.sort.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<E> fmt::Debug for QuerySpec<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("eager_load", &self.eager_load.is_some())
            .field("sort", &self.sort.is_some())
            .field("filter", &self.filter.is_some())
            .finish()
    }
}
