//! Per-request context handed to resolvers, hooks and pipelines
//!
//! Carries what the transport layer extracted from the request: the verb,
//! path parameters, the decoded JSON body and the authenticated actor.

use serde::de::DeserializeOwned;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::entity::Entity;
use crate::error::{Error, Result};

/// Request verb, used to guard update shapes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        write!(f, "{}", name)
    }
}

/// Request data visible to the engine
#[derive(Clone)]
pub struct RequestContext {
    method: Method,
    parameters: HashMap<String, String>,
    payload: Option<serde_json::Value>,
    actor: Option<Arc<dyn Any + Send + Sync>>,
}

impl RequestContext {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            parameters: HashMap::new(),
            payload: None,
            actor: None,
        }
    }

    /// Add a path parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.parameters.insert(key.into(), value.to_string());
        self
    }

    /// Add the path parameter that identifies an entity of type `E`
    pub fn with_id<E: Entity>(self, id: &E::Id) -> Self {
        self.with_parameter(E::id_key(), id)
    }

    /// Attach the request body
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Attach the authenticated actor
    pub fn with_actor<T: Send + Sync + 'static>(mut self, actor: T) -> Self {
        self.actor = Some(Arc::new(actor));
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Raw path parameter
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Identifier of `E` taken from the path
    ///
    /// A missing or unparseable segment can never match a row, so both are
    /// reported as `NotFound`.
    pub fn require_id<E: Entity>(&self) -> Result<E::Id> {
        let key = E::id_key();
        let raw = self
            .parameter(&key)
            .ok_or_else(|| Error::not_found(E::SCHEMA, format!("<missing {}>", key)))?;
        raw.parse::<E::Id>()
            .map_err(|_| Error::not_found(E::SCHEMA, raw))
    }

    /// The authenticated actor as type `T`
    pub fn require_actor<T: Clone + Send + Sync + 'static>(&self) -> Result<T> {
        let actor = self
            .actor
            .as_ref()
            .ok_or_else(|| Error::unauthorized("request is not authenticated"))?;
        actor.downcast_ref::<T>().cloned().ok_or_else(|| {
            Error::unauthorized(format!(
                "authenticated actor is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Decode the body into `I`. An absent body decodes as `{}`.
    pub fn decode<I: DeserializeOwned>(&self) -> Result<I> {
        let payload = self
            .payload
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        serde_json::from_value(payload).map_err(|e| Error::validation(e.to_string()))
    }

    /// Fail with `Validation` unless the request used `expected`
    pub fn require_method(&self, expected: Method) -> Result<()> {
        if self.method != expected {
            return Err(Error::validation(format!(
                "expected {} request, got {}",
                expected, self.method
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("parameters", &self.parameters)
            .field("payload", &self.payload)
            .field("authenticated", &self.actor.is_some())
            .finish()
    }
}
