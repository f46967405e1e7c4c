use std::collections::HashMap;

use async_trait::async_trait;
use fieldsync_common::error::CommonResult;
use fieldsync_core::DurableStore;
use parking_lot::RwLock;
use serde_json::Value;

/// Process-local durable store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    entries: RwLock<HashMap<String, Vec<Value>>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys that currently hold data
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn load(&self, key: &str) -> CommonResult<Vec<Value>> {
        Ok(self.entries.read().get(key).cloned().unwrap_or_default())
    }

    async fn save(&self, key: &str, entries: &[Value]) -> CommonResult<()> {
        self.entries.write().insert(key.to_string(), entries.to_vec());
        Ok(())
    }
}
