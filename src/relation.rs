//! Relation descriptors
//!
//! A descriptor is immutable metadata describing how a target type `T`
//! relates to a related type `R`. It is built once per endpoint and shared
//! across requests; all runtime state lives in the transaction.
//!
//! Shapes:
//! - `ChildOfParent` - `R` stores a foreign key to `T` (the related star names
//!   its target galaxy)
//! - `ParentOfChild` - `T` stores a foreign key to `R`
//! - `Siblings` - a join entity `J` stores one foreign key per side

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::query::{Filter, Query, id_value};
use crate::storage::Transaction;

/// Typed foreign key: a field on `O` holding the identifier of a `P`
pub struct ForeignKey<O, P: Entity> {
    field: &'static str,
    get: fn(&O) -> Option<P::Id>,
    set: fn(&mut O, Option<P::Id>),
}

impl<O, P: Entity> ForeignKey<O, P> {
    pub const fn new(
        field: &'static str,
        get: fn(&O) -> Option<P::Id>,
        set: fn(&mut O, Option<P::Id>),
    ) -> Self {
        Self { field, get, set }
    }

    /// Name of the field in the serialized owner
    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn get(&self, owner: &O) -> Option<P::Id> {
        (self.get)(owner)
    }

    pub fn set(&self, owner: &mut O, value: Option<P::Id>) {
        (self.set)(owner, value)
    }

    /// True when `owner` points at `pointee`
    pub fn points_at(&self, owner: &O, pointee: &P) -> bool {
        match (self.get(owner), pointee.id()) {
            (Some(fk), Some(id)) => fk == id,
            _ => false,
        }
    }

    /// Rows of `O` pointing at the given identifier
    fn matching(&self, id: &P::Id) -> Result<Filter> {
        Ok(Filter::eq(self.field, id_value::<P>(id)?))
    }
}

impl<O, P: Entity> Clone for ForeignKey<O, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<O, P: Entity> Copy for ForeignKey<O, P> {}

impl<O, P: Entity> fmt::Debug for ForeignKey<O, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignKey")
            .field("field", &self.field)
            .field("pointee", &P::SCHEMA)
            .finish()
    }
}

/// Join entity description for a many-to-many relation
pub struct JoinKeys<J: Entity, T: Entity, R: Entity> {
    target: ForeignKey<J, T>,
    related: ForeignKey<J, R>,
    new_row: fn() -> J,
}

impl<J: Entity, T: Entity, R: Entity> JoinKeys<J, T, R> {
    pub fn new(target: ForeignKey<J, T>, related: ForeignKey<J, R>) -> Self
    where
        J: Default,
    {
        Self::with_factory(target, related, J::default)
    }

    /// Join keys whose fresh rows come from `new_row`
    pub fn with_factory(
        target: ForeignKey<J, T>,
        related: ForeignKey<J, R>,
        new_row: fn() -> J,
    ) -> Self {
        Self {
            target,
            related,
            new_row,
        }
    }

    pub fn target_key(&self) -> ForeignKey<J, T> {
        self.target
    }

    pub fn related_key(&self) -> ForeignKey<J, R> {
        self.related
    }

    /// Join rows linking exactly this pair
    fn pair_query(&self, target: &T::Id, related: &R::Id) -> Result<Query<J>> {
        Ok(Query::new()
            .scope(self.target.matching(target)?)
            .scope(self.related.matching(related)?))
    }
}

impl<J: Entity, T: Entity, R: Entity> Clone for JoinKeys<J, T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<J: Entity, T: Entity, R: Entity> Copy for JoinKeys<J, T, R> {}

impl<J: Entity, T: Entity, R: Entity> fmt::Debug for JoinKeys<J, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinKeys")
            .field("schema", &J::SCHEMA)
            .field("target", &self.target)
            .field("related", &self.related)
            .finish()
    }
}

/// Join type of descriptors that have none
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum NoJoin {}

impl Entity for NoJoin {
    type Id = i64;
    const SCHEMA: &'static str = "__no_join";

    fn id(&self) -> Option<i64> {
        match *self {}
    }

    fn set_id(&mut self, _id: i64) {
        match *self {}
    }
}

/// How target `T` and related `R` are linked
pub enum RelationDescriptor<T: Entity, R: Entity, J: Entity = NoJoin> {
    /// `R` owns a foreign key to `T`
    ChildOfParent(ForeignKey<R, T>),
    /// `T` owns a foreign key to `R`
    ParentOfChild(ForeignKey<T, R>),
    /// Join rows of `J` link `T` and `R`
    Siblings(JoinKeys<J, T, R>),
}

impl<T: Entity, R: Entity, J: Entity> RelationDescriptor<T, R, J> {
    /// Short name of the shape, used in logs
    pub fn shape(&self) -> &'static str {
        match self {
            RelationDescriptor::ChildOfParent(_) => "child_of_parent",
            RelationDescriptor::ParentOfChild(_) => "parent_of_child",
            RelationDescriptor::Siblings(_) => "siblings",
        }
    }

    /// Query over the targets linked to `related`
    ///
    /// Sibling scopes read the join table through `tx`; the other shapes
    /// are pure. Nothing is written.
    pub async fn scope<X: Transaction>(&self, tx: &mut X, related: &R) -> Result<Query<T>> {
        let query = Query::new();
        let related_id = related.require_id()?;
        let scoped = match self {
            RelationDescriptor::ChildOfParent(fk) => match fk.get(related) {
                Some(target_id) => query.scope(Filter::eq(T::ID_FIELD, id_value::<T>(&target_id)?)),
                None => query.scope(Filter::never()),
            },
            RelationDescriptor::ParentOfChild(fk) => query.scope(fk.matching(&related_id)?),
            RelationDescriptor::Siblings(keys) => {
                let joins = tx
                    .fetch(&Query::<J>::new().scope(keys.related.matching(&related_id)?))
                    .await?;
                let mut ids = Vec::with_capacity(joins.len());
                for join in &joins {
                    if let Some(target_id) = keys.target.get(join) {
                        ids.push(id_value::<T>(&target_id)?);
                    }
                }
                query.scope(Filter::is_in(T::ID_FIELD, ids))
            }
        };
        Ok(scoped)
    }

    /// True when `target` and `related` are currently linked
    pub async fn is_attached<X: Transaction>(
        &self,
        tx: &mut X,
        target: &T,
        related: &R,
    ) -> Result<bool> {
        match self {
            RelationDescriptor::ChildOfParent(fk) => Ok(fk.points_at(related, target)),
            RelationDescriptor::ParentOfChild(fk) => Ok(fk.points_at(target, related)),
            RelationDescriptor::Siblings(keys) => {
                let query = keys.pair_query(&target.require_id()?, &related.require_id()?)?;
                Ok(tx.count(&query).await? > 0)
            }
        }
    }

    /// Link two persisted entities and save the side that owns the link
    ///
    /// Sibling links are find-or-create: attaching an already linked pair
    /// leaves exactly one join row.
    pub async fn attach<X: Transaction>(
        &self,
        tx: &mut X,
        target: &mut T,
        related: &mut R,
    ) -> Result<()> {
        let target_id = target.require_id()?;
        let related_id = related.require_id()?;
        match self {
            RelationDescriptor::ChildOfParent(fk) => {
                fk.set(related, Some(target_id));
                tx.save(related).await?;
            }
            RelationDescriptor::ParentOfChild(fk) => {
                fk.set(target, Some(related_id));
                tx.save(target).await?;
            }
            RelationDescriptor::Siblings(keys) => {
                let existing = tx.first(&keys.pair_query(&target_id, &related_id)?).await?;
                if existing.is_none() {
                    let mut join = (keys.new_row)();
                    keys.target.set(&mut join, Some(target_id));
                    keys.related.set(&mut join, Some(related_id));
                    tx.save(&mut join).await?;
                }
            }
        }
        tracing::debug!(
            shape = self.shape(),
            target = T::SCHEMA,
            related = R::SCHEMA,
            "attached"
        );
        Ok(())
    }

    /// Remove the link between `target` and `related`
    ///
    /// Fails with `NotFound` when the two are not linked.
    pub async fn detach<X: Transaction>(
        &self,
        tx: &mut X,
        target: &mut T,
        related: &mut R,
    ) -> Result<()> {
        let target_id = target.require_id()?;
        let related_id = related.require_id()?;
        match self {
            RelationDescriptor::ChildOfParent(fk) => {
                if !fk.points_at(related, target) {
                    return Err(Error::not_found(T::SCHEMA, target_id));
                }
                fk.set(related, None);
                tx.save(related).await?;
            }
            RelationDescriptor::ParentOfChild(fk) => {
                if !fk.points_at(target, related) {
                    return Err(Error::not_found(T::SCHEMA, target_id));
                }
                fk.set(target, None);
                tx.save(target).await?;
            }
            RelationDescriptor::Siblings(keys) => {
                let joins = tx.fetch(&keys.pair_query(&target_id, &related_id)?).await?;
                if joins.is_empty() {
                    return Err(Error::not_found(T::SCHEMA, target_id));
                }
                for join in joins {
                    tx.delete::<J>(&join.require_id()?).await?;
                }
            }
        }
        tracing::debug!(
            shape = self.shape(),
            target = T::SCHEMA,
            related = R::SCHEMA,
            "detached"
        );
        Ok(())
    }
}

impl<T: Entity, R: Entity, J: Entity> Clone for RelationDescriptor<T, R, J> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Entity, R: Entity, J: Entity> Copy for RelationDescriptor<T, R, J> {}

impl<T: Entity, R: Entity, J: Entity> fmt::Debug for RelationDescriptor<T, R, J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationDescriptor::ChildOfParent(fk) => {
                f.debug_tuple("ChildOfParent").field(fk).finish()
            }
            RelationDescriptor::ParentOfChild(fk) => {
                f.debug_tuple("ParentOfChild").field(fk).finish()
            }
            RelationDescriptor::Siblings(keys) => f.debug_tuple("Siblings").field(keys).finish(),
        }
    }
}
