//! Collaborator traits for input decoding and output shaping

use serde::de::DeserializeOwned;

use crate::context::RequestContext;
use crate::error::Result;

/// Full create/update payload for entity `E`
///
/// `apply` replaces every mutable field of the entity.
pub trait ResourceInput<E>: DeserializeOwned + Send {
    /// Shape checks beyond what decoding already enforces
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn apply(self, entity: E) -> Result<E>;
}

/// Partial update payload for entity `E`
///
/// Only fields present in the payload are written; absent or null fields
/// leave the entity untouched.
pub trait ResourcePatch<E>: DeserializeOwned + Send {
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn patch(self, entity: E) -> Result<E>;
}

/// Output representation of entity `E`
pub trait ResourceOutput<E>: Sized + Send {
    fn from_entity(entity: E, ctx: &RequestContext) -> Result<Self>;
}

/// Decode and validate the request body as a full input
pub(crate) fn decode_input<E, I: ResourceInput<E>>(ctx: &RequestContext) -> Result<I> {
    let input: I = ctx.decode()?;
    input.validate()?;
    Ok(input)
}

/// Decode and validate the request body as a patch
pub(crate) fn decode_patch<E, P: ResourcePatch<E>>(ctx: &RequestContext) -> Result<P> {
    let patch: P = ctx.decode()?;
    patch.validate()?;
    Ok(patch)
}
