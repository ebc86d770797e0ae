//! Pipelines over a target entity reached through a relation

use std::marker::PhantomData;
use tracing::instrument;

use super::model::{ResourceInput, ResourceOutput, ResourcePatch, decode_input, decode_patch};
use super::outputs;
use crate::context::{Method, RequestContext};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::middleware::{MiddlewareHook, PassThrough};
use crate::pagination::{self, CursorConfig, CursorPage, Page, PageRequest};
use crate::query::{Query, QuerySpec};
use crate::relation::NoJoin;
use crate::resolver::{RelationResolver, ResolvedPair};
use crate::storage::{Database, Transaction, settle};

/// Everything one relational endpoint needs: how to resolve, which hook to
/// run before mutations, and which query spec reads go through
pub struct RelationEndpoint<T: Entity, R: Entity, J: Entity = NoJoin, H = PassThrough> {
    resolver: RelationResolver<T, R, J>,
    hook: H,
    spec: QuerySpec<T>,
}

impl<T: Entity, R: Entity, J: Entity> RelationEndpoint<T, R, J, PassThrough> {
    pub fn new(resolver: RelationResolver<T, R, J>) -> Self {
        Self {
            resolver,
            hook: PassThrough,
            spec: QuerySpec::new(),
        }
    }
}

impl<T: Entity, R: Entity, J: Entity, H: MiddlewareHook<T, R>> RelationEndpoint<T, R, J, H> {
    /// Replace the hook run before every mutation
    pub fn with_hook<G: MiddlewareHook<T, R>>(self, hook: G) -> RelationEndpoint<T, R, J, G> {
        RelationEndpoint {
            resolver: self.resolver,
            hook,
            spec: self.spec,
        }
    }

    pub fn with_spec(mut self, spec: QuerySpec<T>) -> Self {
        self.spec = spec;
        self
    }

    pub fn resolver(&self) -> &RelationResolver<T, R, J> {
        &self.resolver
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn spec(&self) -> &QuerySpec<T> {
        &self.spec
    }

    async fn resolve<X: Transaction>(
        &self,
        tx: &mut X,
        ctx: &RequestContext,
    ) -> Result<ResolvedPair<T, R>> {
        self.resolver.resolve(tx, ctx, Some(&self.spec)).await
    }

    /// Resolve, then hand the pair to the hook
    async fn resolve_guarded<X: Transaction>(
        &self,
        tx: &mut X,
        ctx: &RequestContext,
    ) -> Result<ResolvedPair<T, R>> {
        let pair = self.resolve(tx, ctx).await?;
        self.hook.handle(pair, ctx, tx).await
    }

    /// Targets linked to the related entity of this request
    async fn listing<X: Transaction>(&self, tx: &mut X, ctx: &RequestContext) -> Result<Query<T>> {
        let related = self.resolver.related(tx, ctx).await?;
        self.resolver.targets(tx, &related, Some(&self.spec)).await
    }
}

/// CRUD over targets `T` scoped to a related entity `R`, rendered as `O`
pub struct RelatedResourceController<O, T: Entity, R: Entity, J: Entity = NoJoin, H = PassThrough> {
    endpoint: RelationEndpoint<T, R, J, H>,
    _output: PhantomData<fn() -> O>,
}

impl<O, T, R, J, H> RelatedResourceController<O, T, R, J, H>
where
    O: ResourceOutput<T>,
    T: Entity,
    R: Entity,
    J: Entity,
    H: MiddlewareHook<T, R>,
{
    pub fn new(endpoint: RelationEndpoint<T, R, J, H>) -> Self {
        Self {
            endpoint,
            _output: PhantomData,
        }
    }

    pub fn endpoint(&self) -> &RelationEndpoint<T, R, J, H> {
        &self.endpoint
    }

    /// Create a target and link it to the related entity in one transaction
    ///
    /// Steps: resolve related, run the hook on the fresh target, apply the
    /// input, save, attach. Any failure leaves storage untouched.
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn create<I, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        T: Default,
        I: ResourceInput<T>,
        D: Database,
    {
        let input = decode_input::<T, I>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let related = self.endpoint.resolver.related(&mut tx, ctx).await?;
            let pair = ResolvedPair::new(T::default(), related);
            let (target, mut related) = self
                .endpoint
                .hook
                .handle(pair, ctx, &mut tx)
                .await?
                .into_parts();
            let mut target = input.apply(target)?;
            tx.save(&mut target).await?;
            self.endpoint
                .resolver
                .descriptor()
                .attach(&mut tx, &mut target, &mut related)
                .await?;
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn read<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let pair = self.endpoint.resolve(&mut tx, ctx).await?;
            O::from_entity(pair.target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Full update of a linked target, `PUT` only
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn update<I, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        I: ResourceInput<T>,
        D: Database,
    {
        ctx.require_method(Method::Put)?;
        let input = decode_input::<T, I>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let pair = self.endpoint.resolve_guarded(&mut tx, ctx).await?;
            let mut target = input.apply(pair.target)?;
            tx.save(&mut target).await?;
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Partial update of a linked target, `PATCH` only
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn patch<P, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        P: ResourcePatch<T>,
        D: Database,
    {
        ctx.require_method(Method::Patch)?;
        let patch = decode_patch::<T, P>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let pair = self.endpoint.resolve_guarded(&mut tx, ctx).await?;
            let mut target = patch.patch(pair.target)?;
            tx.save(&mut target).await?;
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Unlink and delete a linked target, returning its last state
    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn delete<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let (mut target, mut related) = self
                .endpoint
                .resolve_guarded(&mut tx, ctx)
                .await?
                .into_parts();
            self.endpoint
                .resolver
                .descriptor()
                .detach(&mut tx, &mut target, &mut related)
                .await?;
            let id = target.require_id()?;
            if !tx.delete::<T>(&id).await? {
                return Err(Error::not_found(T::SCHEMA, &id));
            }
            O::from_entity(target, ctx)
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn all<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<Vec<O>> {
        let mut tx = db.begin().await?;
        let result = async {
            let query = self.endpoint.listing(&mut tx, ctx).await?;
            outputs(pagination::all(&mut tx, &query).await?, ctx)
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn page<D: Database>(
        &self,
        db: &D,
        ctx: &RequestContext,
        request: PageRequest,
    ) -> Result<Page<O>> {
        let mut tx = db.begin().await?;
        let result = async {
            let query = self.endpoint.listing(&mut tx, ctx).await?;
            pagination::paginate(&mut tx, &query, request)
                .await?
                .try_map(|e| O::from_entity(e, ctx))
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(target = T::SCHEMA, related = R::SCHEMA))]
    pub async fn cursor_page<D: Database>(
        &self,
        db: &D,
        ctx: &RequestContext,
        config: &CursorConfig,
    ) -> Result<CursorPage<O>> {
        let mut tx = db.begin().await?;
        let result = async {
            let query = self.endpoint.listing(&mut tx, ctx).await?;
            pagination::paginate_cursor(&mut tx, &query, config)
                .await?
                .try_map(|e| O::from_entity(e, ctx))
        }
        .await;
        settle(tx, result).await
    }
}
