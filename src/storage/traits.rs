//! Storage engine traits
//!
//! The engine itself is an external collaborator. The pipelines only need
//! transactional CRUD over [`Query`] values; everything a pipeline reads or
//! writes goes through exactly one [`Transaction`].

use async_trait::async_trait;

use crate::entity::Entity;
use crate::error::Result;
use crate::query::Query;

/// A storage engine that hands out transactions
#[async_trait]
pub trait Database: Send + Sync {
    /// The transaction type used by this engine
    type Tx: Transaction;

    /// Begin a new unit of work
    async fn begin(&self) -> Result<Self::Tx>;
}

/// A unit of work that is committed or rolled back as a whole
///
/// Dropping a transaction without calling `commit` must discard its writes.
#[async_trait]
pub trait Transaction: Send + Sized {
    /// Rows matching the query, in query order, windowed by offset/limit
    async fn fetch<E: Entity>(&mut self, query: &Query<E>) -> Result<Vec<E>>;

    /// Number of rows matching the query, ignoring its window
    async fn count<E: Entity>(&mut self, query: &Query<E>) -> Result<u64>;

    /// Insert or update. Assigns the identifier when the entity has none.
    async fn save<E: Entity>(&mut self, entity: &mut E) -> Result<()>;

    /// Delete by identifier. Returns false when no row existed.
    async fn delete<E: Entity>(&mut self, id: &E::Id) -> Result<bool>;

    /// Persist all writes made through this transaction
    async fn commit(self) -> Result<()>;

    /// Discard all writes made through this transaction
    async fn rollback(self) -> Result<()>;

    /// First row matching the query
    async fn first<E: Entity>(&mut self, query: &Query<E>) -> Result<Option<E>> {
        let query = query.clone().limit(1);
        Ok(self.fetch(&query).await?.into_iter().next())
    }

    /// Primary-key lookup
    async fn find<E: Entity>(&mut self, id: &E::Id) -> Result<Option<E>> {
        let query = Query::<E>::by_id(id)?;
        self.first(&query).await
    }
}
