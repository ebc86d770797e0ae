//! Linking and unlinking two existing entities

use std::marker::PhantomData;
use tracing::instrument;

use super::model::ResourceOutput;
use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::middleware::{MiddlewareHook, PassThrough};
use crate::query::{Query, QuerySpec};
use crate::relation::NoJoin;
use crate::resolver::{RelationResolver, ResolvedPair};
use crate::storage::{Database, Transaction, settle};

/// Attach/detach endpoints for one relation, rendered as `O`
///
/// `will_attach` runs before a link is created and `will_detach` before one
/// is removed; either may reject the request.
pub struct RelationsController<
    O,
    T: Entity,
    R: Entity,
    J: Entity = NoJoin,
    A = PassThrough,
    D = PassThrough,
> {
    resolver: RelationResolver<T, R, J>,
    spec: QuerySpec<T>,
    will_attach: A,
    will_detach: D,
    _output: PhantomData<fn() -> O>,
}

impl<O, T: Entity, R: Entity, J: Entity> RelationsController<O, T, R, J> {
    pub fn new(resolver: RelationResolver<T, R, J>) -> Self {
        Self {
            resolver,
            spec: QuerySpec::new(),
            will_attach: PassThrough,
            will_detach: PassThrough,
            _output: PhantomData,
        }
    }
}

impl<O, T, R, J, A, D> RelationsController<O, T, R, J, A, D>
where
    O: ResourceOutput<T>,
    T: Entity,
    R: Entity,
    J: Entity,
    A: MiddlewareHook<T, R>,
    D: MiddlewareHook<T, R>,
{
    pub fn will_attach<H: MiddlewareHook<T, R>>(
        self,
        hook: H,
    ) -> RelationsController<O, T, R, J, H, D> {
        RelationsController {
            resolver: self.resolver,
            spec: self.spec,
            will_attach: hook,
            will_detach: self.will_detach,
            _output: PhantomData,
        }
    }

    pub fn will_detach<H: MiddlewareHook<T, R>>(
        self,
        hook: H,
    ) -> RelationsController<O, T, R, J, A, H> {
        RelationsController {
            resolver: self.resolver,
            spec: self.spec,
            will_attach: self.will_attach,
            will_detach: hook,
            _output: PhantomData,
        }
    }

    pub fn with_spec(mut self, spec: QuerySpec<T>) -> Self {
        self.spec = spec;
        self
    }

    /// Link the target named in the path to the related entity
    ///
    /// Linking an already linked pair succeeds without creating a second
    /// link.
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn attach<B: Database>(&self, db: &B, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let related = self.resolver.related(&mut tx, ctx).await?;
            let target = self.find_target(&mut tx, ctx).await?;
            let (mut target, mut related) = self
                .will_attach
                .handle(ResolvedPair::new(target, related), ctx, &mut tx)
                .await?
                .into_parts();
            self.resolver
                .descriptor()
                .attach(&mut tx, &mut target, &mut related)
                .await?;
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Remove the link between the target named in the path and the related
    /// entity. Both entities survive.
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn detach<B: Database>(&self, db: &B, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let pair = self.resolver.resolve(&mut tx, ctx, Some(&self.spec)).await?;
            let (mut target, mut related) = self
                .will_detach
                .handle(pair, ctx, &mut tx)
                .await?
                .into_parts();
            self.resolver
                .descriptor()
                .detach(&mut tx, &mut target, &mut related)
                .await?;
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Target by primary key, linked or not
    async fn find_target<X: Transaction>(&self, tx: &mut X, ctx: &RequestContext) -> Result<T> {
        let id = ctx.require_id::<T>()?;
        let query = self.spec.compose(Query::by_id(&id)?);
        tx.first(&query)
            .await?
            .ok_or_else(|| Error::not_found(T::SCHEMA, &id))
    }
}
