//! Entity and identifier traits
//!
//! An entity is any serde document with an identifier the storage engine
//! assigns on first save. The identifier round-trips through a path segment
//! via `Display`/`FromStr`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Identifier of a persisted entity
pub trait EntityId:
    Clone
    + Debug
    + Display
    + FromStr
    + Eq
    + Ord
    + Hash
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Build the identifier for the n-th row of a table (1-based)
    fn from_sequence(n: u64) -> Self;
}

impl EntityId for i64 {
    fn from_sequence(n: u64) -> Self {
        n as i64
    }
}

impl EntityId for u64 {
    fn from_sequence(n: u64) -> Self {
        n
    }
}

impl EntityId for Uuid {
    fn from_sequence(_n: u64) -> Self {
        Uuid::new_v4()
    }
}

/// A persistable record
///
/// ```ignore
/// #[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// struct Star {
///     id: Option<i64>,
///     title: String,
///     galaxy_id: Option<i64>,
/// }
///
/// impl Entity for Star {
///     type Id = i64;
///     const SCHEMA: &'static str = "stars";
///     fn id(&self) -> Option<i64> { self.id }
///     fn set_id(&mut self, id: i64) { self.id = Some(id) }
/// }
/// ```
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type Id: EntityId;

    /// Table (or collection) name
    const SCHEMA: &'static str;

    /// Name of the identifier field in the serialized document
    const ID_FIELD: &'static str = "id";

    /// Fields filled by eager loading. Storage engines never persist them.
    const ASSOCIATIONS: &'static [&'static str] = &[];

    /// Identifier, `None` until the entity is persisted
    fn id(&self) -> Option<Self::Id>;

    /// Assign the identifier. Called by the storage engine only.
    fn set_id(&mut self, id: Self::Id);

    /// Path parameter carrying this entity's identifier
    fn id_key() -> String {
        format!("{}_id", Self::SCHEMA)
    }

    /// Identifier of an entity that must already be persisted
    fn require_id(&self) -> Result<Self::Id> {
        self.id()
            .ok_or_else(|| Error::transform(format!("{} has no identifier", Self::SCHEMA)))
    }
}
