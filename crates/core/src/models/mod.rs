//! 数据模型
//!
//! - `credential`: 凭证、环境与认证模式
//! - `session`: 持久化的会话记录与对外的会话描述
//! - `http`: HTTP 方法

pub mod credential;
pub mod http;
pub mod session;

pub use credential::{AuthMode, Credential, Environment};
pub use http::HttpMethod;
pub use session::{SessionDescriptor, SessionRecord, DEFAULT_SESSION_TIMEOUT_SECS};
