//! 会话存储 trait

use async_trait::async_trait;
use bunqflow_core::config::{SessionStoreConfig, SessionStoreKind};
use bunqflow_core::{BunqResult, SessionRecord};
use std::sync::Arc;

use crate::{MemorySessionStore, SqliteSessionStore};

/// 按凭证身份读写会话记录
///
/// 实现只负责持久化，同一身份的并发刷新由会话管理器串行化。
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取记录，不存在时返回 None
    async fn load(&self, identity: &str) -> BunqResult<Option<SessionRecord>>;

    /// 覆盖写入记录
    async fn save(&self, identity: &str, record: &SessionRecord) -> BunqResult<()>;

    /// 删除记录
    async fn clear(&self, identity: &str) -> BunqResult<()>;
}

pub type SharedSessionStore = Arc<dyn SessionStore>;

/// 根据配置打开会话存储
pub fn open_session_store(config: &SessionStoreConfig) -> BunqResult<SharedSessionStore> {
    match config.kind {
        SessionStoreKind::Memory => Ok(Arc::new(MemorySessionStore::new())),
        SessionStoreKind::Sqlite => Ok(Arc::new(SqliteSessionStore::open(&config.path)?)),
    }
}
