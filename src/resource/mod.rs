//! Transactional resource pipelines
//!
//! - `ResourceController` - CRUD and listing over one entity type
//! - `RelatedResourceController` - the same, scoped through a relation, with
//!   create-and-attach
//! - `RelationsController` - attach/detach of two existing entities
//!
//! Every mutation runs inside exactly one transaction: it is committed when
//! all steps succeed and rolled back otherwise. Request bodies are decoded
//! and validated before the transaction is opened.

mod controller;
mod model;
mod related;
mod relations;

pub use controller::ResourceController;
pub use model::{ResourceInput, ResourceOutput, ResourcePatch};
pub use related::{RelatedResourceController, RelationEndpoint};
pub use relations::RelationsController;

use crate::context::RequestContext;
use crate::error::Result;

fn outputs<E, O: ResourceOutput<E>>(items: Vec<E>, ctx: &RequestContext) -> Result<Vec<O>> {
    items
        .into_iter()
        .map(|entity| O::from_entity(entity, ctx))
        .collect()
}
