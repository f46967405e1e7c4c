use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use fieldsync_core::{ExecutionError, Operation, OperationHandler};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// Test operation: save a field note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveNote {
    pub text: String,
}

impl SaveNote {
    pub fn new(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSaved {
    pub text: String,
}

impl Operation for SaveNote {
    const KIND: &'static str = "save_note";
    type Output = NoteSaved;
}

/// Operation kind nobody registers a handler for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unregistered;

impl Operation for Unregistered {
    const KIND: &'static str = "unregistered";
    type Output = ();
}

/// Handler that replays scripted results and records every call.
///
/// Once the script is exhausted every call succeeds. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedHandler {
    script: Arc<Mutex<VecDeque<Result<(), ExecutionError>>>>,
    fallback: Arc<Mutex<Option<ExecutionError>>>,
    calls: Arc<Mutex<Vec<String>>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue up the result of the next call
    pub fn then(self, result: Result<(), ExecutionError>) -> Self {
        self.script.lock().push_back(result);
        self
    }

    /// Fail every unscripted call with `error`
    #[must_use]
    pub fn always_fail(self, error: ExecutionError) -> Self {
        *self.fallback.lock() = Some(error);
        self
    }

    /// Block every call until the returned `Notify` is signalled
    pub fn gated(&self) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        *self.gate.lock() = Some(Arc::clone(&notify));
        notify
    }

    /// Note texts in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl OperationHandler<SaveNote> for ScriptedHandler {
    async fn execute(&self, operation: SaveNote) -> Result<NoteSaved, ExecutionError> {
        self.calls.lock().push(operation.text.clone());

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.script.lock().pop_front();
        let result = match scripted {
            Some(result) => result,
            None => match self.fallback.lock().clone() {
                Some(error) => Err(error),
                None => Ok(()),
            },
        };
        result.map(|()| NoteSaved { text: operation.text })
    }
}
