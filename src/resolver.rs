//! Relation resolvers
//!
//! A resolver turns a request into a [`ResolvedPair`]: it first obtains
//! the related entity (from the path or from the authenticated actor), then
//! looks the target up through the relation scope of that entity. Nothing
//! is written.

use tracing::instrument;

use crate::context::RequestContext;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::{Filter, Query, QuerySpec, id_value};
use crate::relation::{NoJoin, RelationDescriptor};
use crate::storage::Transaction;

/// Where the related entity comes from
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Identifier taken from the request path, then looked up by primary key
    #[default]
    PathBased,
    /// The authenticated actor of the request
    ActorBased,
}

/// Target and related entity located for one request
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedPair<T, R> {
    pub target: T,
    pub related: R,
}

impl<T, R> ResolvedPair<T, R> {
    pub fn new(target: T, related: R) -> Self {
        Self { target, related }
    }

    pub fn into_parts(self) -> (T, R) {
        (self.target, self.related)
    }
}

/// Descriptor plus the strategy used to locate the related side
pub struct RelationResolver<T: Entity, R: Entity, J: Entity = NoJoin> {
    descriptor: RelationDescriptor<T, R, J>,
    strategy: Strategy,
}

impl<T: Entity, R: Entity, J: Entity> RelationResolver<T, R, J> {
    pub fn new(descriptor: RelationDescriptor<T, R, J>, strategy: Strategy) -> Self {
        Self {
            descriptor,
            strategy,
        }
    }

    /// Resolver reading the related identifier from the path
    pub fn path(descriptor: RelationDescriptor<T, R, J>) -> Self {
        Self::new(descriptor, Strategy::PathBased)
    }

    /// Resolver using the authenticated actor as the related entity
    pub fn actor(descriptor: RelationDescriptor<T, R, J>) -> Self {
        Self::new(descriptor, Strategy::ActorBased)
    }

    pub fn descriptor(&self) -> &RelationDescriptor<T, R, J> {
        &self.descriptor
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// The related entity of this request
    ///
    /// Actor-based resolution re-reads the actor's row inside `tx`, so later
    /// writes to the related side start from committed state. An actor that
    /// has no row is treated as unauthenticated.
    pub async fn related<X: Transaction>(&self, tx: &mut X, ctx: &RequestContext) -> Result<R> {
        match self.strategy {
            Strategy::PathBased => {
                let id = ctx.require_id::<R>()?;
                tx.find::<R>(&id)
                    .await?
                    .ok_or_else(|| Error::not_found(R::SCHEMA, &id))
            }
            Strategy::ActorBased => {
                let actor = ctx.require_actor::<R>()?;
                let id = actor
                    .id()
                    .ok_or_else(|| Error::unauthorized("actor is not persisted"))?;
                tx.find::<R>(&id).await?.ok_or_else(|| {
                    Error::unauthorized(format!("actor {} no longer exists", id))
                })
            }
        }
    }

    /// Targets linked to `related`, with `spec` composed on top
    pub async fn targets<X: Transaction>(
        &self,
        tx: &mut X,
        related: &R,
        spec: Option<&QuerySpec<T>>,
    ) -> Result<Query<T>> {
        let scope = self.descriptor.scope(tx, related).await?;
        Ok(match spec {
            Some(spec) => spec.compose(scope),
            None => scope,
        })
    }

    /// Locate the related entity, then the target named in the path
    ///
    /// Fails with `NotFound` when either side is missing or the two are not
    /// linked, and with `Unauthorized` when an actor is required but absent.
    #[instrument(
        level = "debug",
        skip_all,
        fields(target = T::SCHEMA, related = R::SCHEMA, shape = self.descriptor.shape())
    )]
    pub async fn resolve<X: Transaction>(
        &self,
        tx: &mut X,
        ctx: &RequestContext,
        spec: Option<&QuerySpec<T>>,
    ) -> Result<ResolvedPair<T, R>> {
        let related = self.related(tx, ctx).await?;
        let target_id = ctx.require_id::<T>()?;
        let query = self
            .targets(tx, &related, spec)
            .await?
            .scope(Filter::eq(T::ID_FIELD, id_value::<T>(&target_id)?));
        let target = tx
            .first(&query)
            .await?
            .ok_or_else(|| Error::not_found(T::SCHEMA, &target_id))?;
        Ok(ResolvedPair::new(target, related))
    }
}

impl<T: Entity, R: Entity, J: Entity> Clone for RelationResolver<T, R, J> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor,
            strategy: self.strategy,
        }
    }
}

impl<T: Entity, R: Entity, J: Entity> std::fmt::Debug for RelationResolver<T, R, J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationResolver")
            .field("descriptor", &self.descriptor)
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::context::Method;
    use crate::query::{EagerLoad, EagerLoadSet};
    use crate::relation::ForeignKey;
    use crate::storage::{Database, MemoryDatabase};
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct User {
        id: Option<i64>,
        name: String,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Todo {
        id: Option<i64>,
        title: String,
        user_id: Option<i64>,
        #[serde(default)]
        owner: Vec<User>,
    }

    impl Entity for User {
        type Id = i64;
        const SCHEMA: &'static str = "users";

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    impl Entity for Todo {
        type Id = i64;
        const SCHEMA: &'static str = "todos";
        const ASSOCIATIONS: &'static [&'static str] = &["owner"];

        fn id(&self) -> Option<i64> {
            self.id
        }

        fn set_id(&mut self, id: i64) {
            self.id = Some(id);
        }
    }

    fn todos_of_user() -> RelationDescriptor<Todo, User> {
        RelationDescriptor::ParentOfChild(ForeignKey::new(
            "user_id",
            |t: &Todo| t.user_id,
            |t: &mut Todo, id: Option<i64>| t.user_id = id,
        ))
    }

    /// Users 1 and 2; todo 1 belongs to user 1, todo 2 to user 2
    async fn fixture() -> MemoryDatabase {
        let db = MemoryDatabase::new();
        let mut tx = db.begin().await.unwrap();
        for (name, title) in [("ada", "compile"), ("bob", "review")] {
            let mut user = User {
                name: name.into(),
                ..Default::default()
            };
            tx.save(&mut user).await.unwrap();
            tx.save(&mut Todo {
                title: title.into(),
                user_id: user.id,
                ..Default::default()
            })
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_path_based_resolution() {
        let db = fixture().await;
        let mut tx = db.begin().await.unwrap();
        let resolver = RelationResolver::path(todos_of_user());

        let ctx = RequestContext::new(Method::Get)
            .with_id::<User>(&1)
            .with_id::<Todo>(&1);
        let pair = resolver.resolve(&mut tx, &ctx, None).await.unwrap();
        assert_eq!(pair.target.title, "compile");
        assert_eq!(pair.related.name, "ada");
    }

    #[tokio::test]
    async fn test_unlinked_target_is_not_found() {
        let db = fixture().await;
        let mut tx = db.begin().await.unwrap();
        let resolver = RelationResolver::path(todos_of_user());

        let ctx = RequestContext::new(Method::Get)
            .with_id::<User>(&1)
            .with_id::<Todo>(&2);
        let err = resolver.resolve(&mut tx, &ctx, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_missing_related_fails_before_target_lookup() {
        let db = fixture().await;
        let mut tx = db.begin().await.unwrap();
        let resolver = RelationResolver::path(todos_of_user());

        let ctx = RequestContext::new(Method::Get)
            .with_id::<User>(&99)
            .with_id::<Todo>(&1);
        match resolver.resolve(&mut tx, &ctx, None).await.unwrap_err() {
            Error::NotFound { schema, .. } => assert_eq!(schema, "users"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_actor_based_resolution() {
        let db = fixture().await;
        let mut tx = db.begin().await.unwrap();
        let resolver = RelationResolver::actor(todos_of_user());

        let bob = User {
            id: Some(2),
            name: "stale name".into(),
        };
        let ctx = RequestContext::new(Method::Get)
            .with_actor(bob)
            .with_id::<Todo>(&2);
        let pair = resolver.resolve(&mut tx, &ctx, None).await.unwrap();
        assert_eq!(pair.related.name, "bob");

        let anonymous = RequestContext::new(Method::Get).with_id::<Todo>(&2);
        let err = resolver.resolve(&mut tx, &anonymous, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let ghost = RequestContext::new(Method::Get)
            .with_actor(User {
                id: Some(7),
                name: "ghost".into(),
            })
            .with_id::<Todo>(&2);
        let err = resolver.resolve(&mut tx, &ghost, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[tokio::test]
    async fn test_spec_applies_to_target_lookup() {
        let db = fixture().await;
        let mut tx = db.begin().await.unwrap();
        let resolver = RelationResolver::path(todos_of_user());
        let spec = QuerySpec::new()
            .eager_load(EagerLoadSet::new([EagerLoad::parent::<User>("owner", "user_id")]))
            .filter(Filter::eq("owner.name", "nobody"));

        let ctx = RequestContext::new(Method::Get)
            .with_id::<User>(&1)
            .with_id::<Todo>(&1);
        let err = resolver.resolve(&mut tx, &ctx, Some(&spec)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let spec = QuerySpec::new()
            .eager_load(EagerLoadSet::new([EagerLoad::parent::<User>("owner", "user_id")]));
        let pair = resolver.resolve(&mut tx, &ctx, Some(&spec)).await.unwrap();
        assert_eq!(pair.target.owner[0].name, "ada");
    }
}
