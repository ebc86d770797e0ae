//! Pipelines over a single entity type, with no relation involved

use std::marker::PhantomData;
use tracing::instrument;

use super::model::{ResourceInput, ResourceOutput, ResourcePatch, decode_input, decode_patch};
use super::outputs;
use crate::context::{Method, RequestContext};
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::pagination::{self, CursorConfig, CursorPage, Page, PageRequest};
use crate::query::{Query, QuerySpec};
use crate::storage::{Database, Transaction, settle};

/// CRUD and listing for entity `E`, rendered as `O`
pub struct ResourceController<E: Entity, O> {
    spec: QuerySpec<E>,
    _output: PhantomData<fn() -> O>,
}

impl<E: Entity, O: ResourceOutput<E>> ResourceController<E, O> {
    pub fn new() -> Self {
        Self::with_spec(QuerySpec::new())
    }

    /// Controller whose reads and lookups go through `spec`
    pub fn with_spec(spec: QuerySpec<E>) -> Self {
        Self {
            spec,
            _output: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec<E> {
        &self.spec
    }

    /// Create a fresh entity from the request body
    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn create<I, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        E: Default,
        I: ResourceInput<E>,
        D: Database,
    {
        let input = decode_input::<E, I>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let mut entity = input.apply(E::default())?;
            tx.save(&mut entity).await?;
            O::from_entity(entity, ctx)
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn read<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let entity = self.find(&mut tx, ctx).await?;
            O::from_entity(entity, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Full update, `PUT` only
    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn update<I, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        I: ResourceInput<E>,
        D: Database,
    {
        ctx.require_method(Method::Put)?;
        let input = decode_input::<E, I>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let entity = self.find(&mut tx, ctx).await?;
            let mut entity = input.apply(entity)?;
            tx.save(&mut entity).await?;
            O::from_entity(entity, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Partial update, `PATCH` only
    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn patch<P, D>(&self, db: &D, ctx: &RequestContext) -> Result<O>
    where
        P: ResourcePatch<E>,
        D: Database,
    {
        ctx.require_method(Method::Patch)?;
        let patch = decode_patch::<E, P>(ctx)?;
        let mut tx = db.begin().await?;
        let result = async {
            let entity = self.find(&mut tx, ctx).await?;
            let mut entity = patch.patch(entity)?;
            tx.save(&mut entity).await?;
            O::from_entity(entity, ctx)
        }
        .await;
        settle(tx, result).await
    }

    /// Delete the entity named in the path and return its last state
    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn delete<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<O> {
        let mut tx = db.begin().await?;
        let result = async {
            let entity = self.find(&mut tx, ctx).await?;
            let id = entity.require_id()?;
            if !tx.delete::<E>(&id).await? {
                return Err(Error::not_found(E::SCHEMA, &id));
            }
            O::from_entity(entity, ctx)
        }
        .await;
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn all<D: Database>(&self, db: &D, ctx: &RequestContext) -> Result<Vec<O>> {
        let mut tx = db.begin().await?;
        let query = self.spec.compose(Query::new());
        let result = pagination::all(&mut tx, &query).await;
        let result = result.and_then(|items| outputs(items, ctx));
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA, page = request.page))]
    pub async fn page<D: Database>(
        &self,
        db: &D,
        ctx: &RequestContext,
        request: PageRequest,
    ) -> Result<Page<O>> {
        let mut tx = db.begin().await?;
        let query = self.spec.compose(Query::new());
        let result = pagination::paginate(&mut tx, &query, request)
            .await
            .and_then(|page| page.try_map(|e| O::from_entity(e, ctx)));
        settle(tx, result).await
    }

    #[instrument(level = "debug", skip_all, fields(schema = E::SCHEMA))]
    pub async fn cursor_page<D: Database>(
        &self,
        db: &D,
        ctx: &RequestContext,
        config: &CursorConfig,
    ) -> Result<CursorPage<O>> {
        let mut tx = db.begin().await?;
        let query = self.spec.compose(Query::new());
        let result = pagination::paginate_cursor(&mut tx, &query, config)
            .await
            .and_then(|page| page.try_map(|e| O::from_entity(e, ctx)));
        settle(tx, result).await
    }

    /// Entity named in the path, looked up through the controller's spec
    async fn find<X: Transaction>(&self, tx: &mut X, ctx: &RequestContext) -> Result<E> {
        let id = ctx.require_id::<E>()?;
        let query = self.spec.compose(Query::by_id(&id)?);
        tx.first(&query)
            .await?
            .ok_or_else(|| Error::not_found(E::SCHEMA, &id))
    }
}

impl<E: Entity, O: ResourceOutput<E>> Default for ResourceController<E, O> {
    fn default() -> Self {
        Self::new()
    }
}
