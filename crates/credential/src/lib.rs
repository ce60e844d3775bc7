//! 会话存储
//!
//! 按凭证身份持久化握手产物（安装 token、设备 ID、会话 token 等），
//! 跨多次工作流执行复用。
//!
//! ## 模块结构
//!
//! - `store` - `SessionStore` trait
//! - `memory` - 进程内存储
//! - `sqlite` - SQLite 持久化存储

mod memory;
mod sqlite;
mod store;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
pub use store::{open_session_store, SessionStore, SharedSessionStore};
