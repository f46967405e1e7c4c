//! Kind -> executor mapping
//!
//! Handlers are registered against their typed [`Operation`]. The registry
//! keeps a type-erased view for the queue processor, which only has the
//! stored kind and JSON payload, and a typed view for the gateway, which
//! executes the caller's value directly.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use super::errors::ExecutionError;
use super::ports::{handler_fn, Operation, OperationHandler};

/// Executes a stored payload for one kind
#[async_trait]
pub(crate) trait ErasedHandler: Send + Sync {
    async fn call(&self, payload: Value) -> Result<Value, ExecutionError>;
}

struct TypedHandler<O: Operation> {
    inner: Arc<dyn OperationHandler<O>>,
}

#[async_trait]
impl<O: Operation> ErasedHandler for TypedHandler<O> {
    async fn call(&self, payload: Value) -> Result<Value, ExecutionError> {
        let operation: O = serde_json::from_value(payload).map_err(|err| {
            ExecutionError::permanent(format!("payload for '{}' does not decode: {err}", O::KIND))
        })?;
        let output = self.inner.execute(operation).await?;
        serde_json::to_value(output).map_err(|err| {
            ExecutionError::permanent(format!("result of '{}' does not encode: {err}", O::KIND))
        })
    }
}

struct Registration {
    erased: Arc<dyn ErasedHandler>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Mapping from operation kind to executor, owned by calling code
#[derive(Default)]
pub struct ExecutorRegistry {
    handlers: RwLock<HashMap<&'static str, Registration>>,
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry").field("kinds", &self.kinds()).finish()
    }
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `O::KIND`, replacing any previous handler
    pub fn register<O, H>(&self, handler: H)
    where
        O: Operation,
        H: OperationHandler<O> + 'static,
    {
        let typed: Arc<dyn OperationHandler<O>> = Arc::new(handler);
        let registration = Registration {
            erased: Arc::new(TypedHandler { inner: Arc::clone(&typed) }),
            typed: Arc::new(typed),
        };
        if self.handlers.write().insert(O::KIND, registration).is_some() {
            debug!(kind = O::KIND, "Replaced operation handler");
        }
    }

    /// Register an async closure for `O::KIND`
    pub fn register_fn<O, F, Fut>(&self, f: F)
    where
        O: Operation,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O::Output, ExecutionError>> + Send + 'static,
    {
        self.register::<O, _>(handler_fn(f));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.read().contains_key(kind)
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.handlers.read().keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Typed handler for `O`, if one is registered
    pub fn handler<O: Operation>(&self) -> Option<Arc<dyn OperationHandler<O>>> {
        let handlers = self.handlers.read();
        let registration = handlers.get(O::KIND)?;
        registration.typed.downcast_ref::<Arc<dyn OperationHandler<O>>>().cloned()
    }

    /// Run the handler for `kind` on a stored payload
    pub async fn dispatch(&self, kind: &str, payload: Value) -> Result<Value, ExecutionError> {
        let handler = self.erased(kind).ok_or_else(|| ExecutionError::unknown_kind(kind))?;
        handler.call(payload).await
    }

    fn erased(&self, kind: &str) -> Option<Arc<dyn ErasedHandler>> {
        self.handlers.read().get(kind).map(|registration| Arc::clone(&registration.erased))
    }
}
