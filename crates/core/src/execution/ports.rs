//! Port interfaces for operation executors
//!
//! The queue only sees `kind` strings and JSON payloads. Callers describe
//! each kind once as an [`Operation`] type so the payload shape and the
//! result type are checked at compile time on both the execute path and the
//! handler.

use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::ExecutionError;

/// A queueable operation kind and its payload shape
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// struct SaveField { field_id: String, crop: String }
///
/// impl Operation for SaveField {
///     const KIND: &'static str = "save_field";
///     type Output = FieldRecord;
/// }
/// ```
pub trait Operation: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable discriminator stored with queued entries
    const KIND: &'static str;

    /// What a successful execution returns
    type Output: Serialize + DeserializeOwned + Send + 'static;
}

/// Performs the real work for one operation kind
#[async_trait]
pub trait OperationHandler<O: Operation>: Send + Sync {
    async fn execute(&self, operation: O) -> Result<O::Output, ExecutionError>;
}

/// Adapts an async closure into an [`OperationHandler`]
pub struct FnHandler<O, F> {
    f: F,
    _operation: PhantomData<fn(O)>,
}

/// Wrap `f` so it can be registered as a handler
pub fn handler_fn<O, F, Fut>(f: F) -> FnHandler<O, F>
where
    O: Operation,
    F: Fn(O) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O::Output, ExecutionError>> + Send + 'static,
{
    FnHandler { f, _operation: PhantomData }
}

#[async_trait]
impl<O, F, Fut> OperationHandler<O> for FnHandler<O, F>
where
    O: Operation,
    F: Fn(O) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O::Output, ExecutionError>> + Send + 'static,
{
    async fn execute(&self, operation: O) -> Result<O::Output, ExecutionError> {
        (self.f)(operation).await
    }
}
