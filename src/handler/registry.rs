//! Handler registry for dispatching queries by name.
//!
//! The registry maps handler names to boxed handlers. Registration happens
//! before the server starts serving; after that the registry is frozen
//! behind an `Arc` and only read, so dispatch needs no locking.

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::HandlerResult;
use crate::codec::PayloadCodec;
use crate::error::{Result, WirecallError};
use crate::protocol::{Query, Response};

/// Prefix marking handler names reserved for the framework.
pub const RESERVED_PREFIX: char = '_';

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A dispatch target: turns a Query into a Response.
///
/// Implementations never fail the dispatch itself; every failure mode is
/// expressed as a failure Response. The worker stamps the response's
/// `dispatch` after the call.
pub trait Handler: Send + Sync + 'static {
    /// Handle a query.
    fn call(&self, query: &Query) -> BoxFuture<'static, Response>;
}

/// Wrapper that decodes the query payload into the handler's input type,
/// invokes the handler, and encodes the return value into a Response.
///
/// Payload decode failures and handler errors both become failure
/// Responses carrying the error text.
pub struct TypedHandler<C, F, T, R, Fut> {
    handler: F,
    _phantom: PhantomData<fn() -> (C, T, R, Fut)>,
}

impl<C, F, T, R, Fut> TypedHandler<C, F, T, R, Fut>
where
    C: PayloadCodec + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<C, F, T, R, Fut> Handler for TypedHandler<C, F, T, R, Fut>
where
    C: PayloadCodec + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = HandlerResult<R>> + Send + 'static,
{
    fn call(&self, query: &Query) -> BoxFuture<'static, Response> {
        let dispatch = query.dispatch;

        let input: T = match C::decode(&query.message_data) {
            Ok(value) => value,
            Err(e) => {
                let message = e.to_string();
                return Box::pin(async move { Response::failure(dispatch, message) });
            }
        };

        let fut = (self.handler)(input);
        Box::pin(async move {
            match fut.await {
                Ok(output) => match C::encode(&output) {
                    Ok(data) => Response::success(dispatch, data),
                    Err(e) => Response::failure(dispatch, e.to_string()),
                },
                Err(e) => Response::failure(dispatch, e.message().to_string()),
            }
        })
    }
}

/// Registry mapping handler names to handlers. Keys are unique.
pub struct HandlerRegistry {
    handlers: HashMap<String, Box<dyn Handler>>,
}

impl HandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a typed handler under `name`.
    ///
    /// # Errors
    ///
    /// Fails with `ReservedName` for names starting with `_` and with
    /// `HandlerAlreadyRegistered` for duplicate names.
    pub fn register<C, F, T, R, Fut>(&mut self, name: &str, handler: F) -> Result<()>
    where
        C: PayloadCodec + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        if name.starts_with(RESERVED_PREFIX) {
            return Err(WirecallError::ReservedName(name.to_string()));
        }
        self.insert(name, Box::new(TypedHandler::<C, F, T, R, Fut>::new(handler)))
    }

    /// Register a framework handler, allowed to use reserved names.
    pub(crate) fn register_reserved<C, F, T, R, Fut>(&mut self, name: &str, handler: F) -> Result<()>
    where
        C: PayloadCodec + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = HandlerResult<R>> + Send + 'static,
    {
        self.insert(name, Box::new(TypedHandler::<C, F, T, R, Fut>::new(handler)))
    }

    fn insert(&mut self, name: &str, handler: Box<dyn Handler>) -> Result<()> {
        if self.handlers.contains_key(name) {
            return Err(WirecallError::HandlerAlreadyRegistered(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers.get(name).map(|h| h.as_ref())
    }

    /// Check whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
