use std::collections::HashMap;

use async_trait::async_trait;
use fieldsync_common::error::{CommonError, CommonResult};
use fieldsync_core::DurableStore;
use parking_lot::Mutex;
use serde_json::Value;

/// In-memory `DurableStore` with a switchable write failure.
#[derive(Default)]
pub struct MemoryDurableStore {
    data: Mutex<HashMap<String, Vec<Value>>>,
    fail_saves: Mutex<bool>,
    saves: Mutex<usize>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `save` fail until switched back
    pub fn fail_saves(&self, fail: bool) {
        *self.fail_saves.lock() = fail;
    }

    /// Successful writes so far
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    pub fn entries(&self, key: &str) -> Vec<Value> {
        self.data.lock().get(key).cloned().unwrap_or_default()
    }

    pub fn seed(&self, key: &str, entries: Vec<Value>) {
        self.data.lock().insert(key.to_string(), entries);
    }
}

#[async_trait]
impl DurableStore for MemoryDurableStore {
    async fn load(&self, key: &str) -> CommonResult<Vec<Value>> {
        Ok(self.entries(key))
    }

    async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()> {
        if *self.fail_saves.lock() {
            return Err(CommonError::persistence_op("save", "simulated write failure"));
        }
        *self.saves.lock() += 1;
        self.data.lock().insert(key.to_string(), entries.to_vec());
        Ok(())
    }
}
