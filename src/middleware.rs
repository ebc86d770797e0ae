//! Middleware hooks run by mutation pipelines
//!
//! A hook sees the resolved pair before anything is written. Returning an
//! error aborts the pipeline and rolls the transaction back; returning the
//! pair (possibly modified) lets the pipeline continue. Hooks that need to
//! read or write storage must go through the transaction they are handed.

use async_trait::async_trait;

use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::Result;
use crate::resolver::ResolvedPair;
use crate::storage::Transaction;

/// Interception point bound to a `(target, related)` pair of types
#[async_trait]
pub trait MiddlewareHook<T: Entity, R: Entity>: Send + Sync {
    async fn handle<X: Transaction>(
        &self,
        pair: ResolvedPair<T, R>,
        ctx: &RequestContext,
        tx: &mut X,
    ) -> Result<ResolvedPair<T, R>>;
}

/// Hook that lets every pair through unchanged
#[derive(Copy, Clone, Debug, Default)]
pub struct PassThrough;

#[async_trait]
impl<T: Entity, R: Entity> MiddlewareHook<T, R> for PassThrough {
    async fn handle<X: Transaction>(
        &self,
        pair: ResolvedPair<T, R>,
        _ctx: &RequestContext,
        _tx: &mut X,
    ) -> Result<ResolvedPair<T, R>> {
        Ok(pair)
    }
}

/// Hook built from a synchronous check
///
/// ```ignore
/// let owner_only = Guard::new(|pair: &ResolvedPair<Todo, User>, ctx: &RequestContext| {
///     let user = ctx.require_actor::<User>()?;
///     if pair.target.user_id != user.id {
///         return Err(Error::unauthorized("not the owner"));
///     }
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct Guard<F> {
    check: F,
}

impl<F> Guard<F> {
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<T, R, F> MiddlewareHook<T, R> for Guard<F>
where
    T: Entity,
    R: Entity,
    F: Fn(&ResolvedPair<T, R>, &RequestContext) -> Result<()> + Send + Sync,
{
    async fn handle<X: Transaction>(
        &self,
        pair: ResolvedPair<T, R>,
        ctx: &RequestContext,
        _tx: &mut X,
    ) -> Result<ResolvedPair<T, R>> {
        if let Err(err) = (self.check)(&pair, ctx) {
            tracing::debug!(
                target_schema = T::SCHEMA,
                related_schema = R::SCHEMA,
                error = %err,
                "guard rejected request"
            );
            return Err(err);
        }
        Ok(pair)
    }
}

impl<F> std::fmt::Debug for Guard<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::context::Method;
    use crate::error::Error;
    use crate::storage::{Database, MemoryDatabase};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Doc {
        id: Option<i64>,
        owner: String,
    }

    impl Entity for Doc {
        type Id = i64;
        const SCHEMA: &'static str = "docs";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    fn pair(owner: &str) -> ResolvedPair<Doc, Doc> {
        let doc = Doc {
            id: Some(1),
            owner: owner.into(),
        };
        ResolvedPair::new(doc.clone(), doc)
    }

    #[tokio::test]
    async fn test_pass_through_is_identity() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let ctx = RequestContext::new(Method::Post);
        let out = PassThrough.handle(pair("ada"), &ctx, &mut tx).await.unwrap();
        assert_eq!(out, pair("ada"));
    }

    #[tokio::test]
    async fn test_guard_rejects() {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        let guard = Guard::new(|pair: &ResolvedPair<Doc, Doc>, ctx: &RequestContext| {
            let actor = ctx.require_actor::<String>()?;
            if pair.target.owner != actor {
                return Err(Error::unauthorized("not the owner"));
            }
            Ok(())
        });

        let ctx = RequestContext::new(Method::Put).with_actor("ada".to_string());
        assert!(guard.handle(pair("ada"), &ctx, &mut tx).await.is_ok());

        let err = guard.handle(pair("bob"), &ctx, &mut tx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
