//! Pagination engines
//!
//! Both engines take an already composed query and run it through a
//! transaction:
//!
//! - `paginate` - 1-based page number + page size, with total-count metadata
//! - `paginate_cursor` - opaque cursor + limit, stable under concurrent inserts

mod cursor;

use serde::{Deserialize, Serialize};

pub use cursor::{CursorConfig, CursorPage, paginate_cursor};

use crate::entity::Entity;
use crate::error::Result;
use crate::query::Query;
use crate::storage::Transaction;

/// Offset pagination request (page numbers start at 1)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub per: u64,
}

impl PageRequest {
    pub fn new(page: u64, per: u64) -> Self {
        Self {
            page: page.max(1),
            per: per.max(1),
        }
    }

    fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.per)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 10)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page: u64,
    pub per: u64,
    pub total: u64,
}

impl PageMetadata {
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.per.max(1))
    }
}

/// One page of results
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub metadata: PageMetadata,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            metadata: self.metadata,
        }
    }

    pub fn try_map<U>(self, f: impl FnMut(T) -> Result<U>) -> Result<Page<U>> {
        Ok(Page {
            items: self.items.into_iter().map(f).collect::<Result<_>>()?,
            metadata: self.metadata,
        })
    }
}

/// Run `query` as one page. Pages past the end are empty, not errors.
pub async fn paginate<E: Entity, X: Transaction>(
    tx: &mut X,
    query: &Query<E>,
    request: PageRequest,
) -> Result<Page<E>> {
    let base = query.unbounded();
    let total = tx.count(&base).await?;
    let items = tx
        .fetch(&base.offset(request.offset()).limit(request.per))
        .await?;
    Ok(Page {
        items,
        metadata: PageMetadata {
            page: request.page,
            per: request.per,
            total,
        },
    })
}

/// Run `query` without a window
pub async fn all<E: Entity, X: Transaction>(tx: &mut X, query: &Query<E>) -> Result<Vec<E>> {
    tx.fetch(&query.unbounded()).await
}
