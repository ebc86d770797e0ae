//! Relation resolution and transactional mutation for REST-style resources
//!
//! Entities are plain serde documents implementing [`Entity`]. Relations
//! between them are described once with a [`RelationDescriptor`]; a
//! [`RelationResolver`] turns a request into the pair of entities it is
//! about, and the controllers in [`resource`] run create/read/update/delete,
//! attach/detach and paginated listing over any [`Database`], each mutation
//! inside a single transaction.

pub mod config;
pub mod context;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod pagination;
pub mod query;
pub mod relation;
pub mod resolver;
pub mod resource;
pub mod storage;

pub use config::{PaginationSettings, RestKitConfig};
pub use context::{Method, RequestContext};
pub use entity::{Entity, EntityId};
pub use error::{Error, ErrorKind, Result};
pub use middleware::{Guard, MiddlewareHook, PassThrough};
pub use pagination::{CursorConfig, CursorPage, Page, PageMetadata, PageRequest};
pub use query::{
    Direction, EagerLoad, EagerLoadSet, Filter, FnModifier, Query, QueryModifier, QuerySpec, Sort,
    SortSet,
};
pub use relation::{ForeignKey, JoinKeys, NoJoin, RelationDescriptor};
pub use resolver::{RelationResolver, ResolvedPair, Strategy};
pub use resource::{
    RelatedResourceController, RelationEndpoint, RelationsController, ResourceController,
    ResourceInput, ResourceOutput, ResourcePatch,
};
pub use storage::{Database, MemoryDatabase, MemoryTransaction, Transaction};
