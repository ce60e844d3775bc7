use async_trait::async_trait;
use bunqflow_core::{BunqResult, SessionRecord};
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::store::SessionStore;

/// 进程内会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, identity: &str) -> BunqResult<Option<SessionRecord>> {
        Ok(self.records.read().get(identity).cloned())
    }

    async fn save(&self, identity: &str, record: &SessionRecord) -> BunqResult<()> {
        self.records
            .write()
            .insert(identity.to_string(), record.clone());
        Ok(())
    }

    async fn clear(&self, identity: &str) -> BunqResult<()> {
        self.records.write().remove(identity);
        Ok(())
    }
}
