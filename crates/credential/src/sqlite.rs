//! SQLite 会话存储
//!
//! 表结构：`bunq_sessions(identity, environment, record_json, updated_at)`，
//! 记录本体以 JSON 保存，便于字段演进。

use async_trait::async_trait;
use bunqflow_core::{BunqError, BunqResult, SessionRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::store::SessionStore;

pub type DbConnection = Arc<Mutex<Connection>>;

struct SessionDao;

impl SessionDao {
    fn create_table(conn: &Connection) -> Result<(), rusqlite::Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bunq_sessions (
                identity TEXT PRIMARY KEY,
                environment TEXT NOT NULL,
                record_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
    }

    fn get(conn: &Connection, identity: &str) -> Result<Option<String>, rusqlite::Error> {
        conn.query_row(
            "SELECT record_json FROM bunq_sessions WHERE identity = ?1",
            params![identity],
            |row| row.get(0),
        )
        .optional()
    }

    fn upsert(
        conn: &Connection,
        identity: &str,
        environment: &str,
        record_json: &str,
        updated_at: &str,
    ) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO bunq_sessions (identity, environment, record_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(identity) DO UPDATE SET
                environment = excluded.environment,
                record_json = excluded.record_json,
                updated_at = excluded.updated_at",
            params![identity, environment, record_json, updated_at],
        )?;
        Ok(())
    }

    fn delete(conn: &Connection, identity: &str) -> Result<usize, rusqlite::Error> {
        conn.execute(
            "DELETE FROM bunq_sessions WHERE identity = ?1",
            params![identity],
        )
    }
}

/// SQLite 会话存储
pub struct SqliteSessionStore {
    db: DbConnection,
}

impl SqliteSessionStore {
    /// 打开（必要时创建）数据库文件
    pub fn open(path: &Path) -> BunqResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BunqError::Store(format!("创建目录失败: {e}")))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| BunqError::Store(format!("打开数据库失败: {e}")))?;
        Self::from_connection(conn)
    }

    /// 内存数据库
    pub fn in_memory() -> BunqResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| BunqError::Store(format!("打开数据库失败: {e}")))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> BunqResult<Self> {
        SessionDao::create_table(&conn).map_err(|e| BunqError::Store(format!("建表失败: {e}")))?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> BunqResult<T> {
        let conn = self
            .db
            .lock()
            .map_err(|e| BunqError::Store(format!("数据库锁定失败: {e}")))?;
        f(&conn).map_err(|e| BunqError::Store(e.to_string()))
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load(&self, identity: &str) -> BunqResult<Option<SessionRecord>> {
        let Some(json) = self.with_conn(|conn| SessionDao::get(conn, identity))? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // 旧格式或损坏的记录按空记录处理，会触发完整握手
                tracing::warn!("[SessionStore] 记录解析失败，忽略: identity={identity}, error={e}");
                Ok(None)
            }
        }
    }

    async fn save(&self, identity: &str, record: &SessionRecord) -> BunqResult<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| BunqError::Store(format!("序列化失败: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            SessionDao::upsert(conn, identity, record.environment.as_str(), &json, &now)
        })
    }

    async fn clear(&self, identity: &str) -> BunqResult<()> {
        let removed = self.with_conn(|conn| SessionDao::delete(conn, identity))?;
        tracing::debug!("[SessionStore] 清除会话记录: identity={identity}, removed={removed}");
        Ok(())
    }
}
