//! 核心类型和工具模块
//!
//! 包含凭证与会话模型、错误类型、配置、日志和请求签名。

pub mod config;
pub mod errors;
pub mod logger;
pub mod models;
pub mod signer;

pub use errors::{ApiCallFailure, BunqError, BunqResult, HandshakeStep};
pub use models::{
    AuthMode, Credential, Environment, HttpMethod, SessionDescriptor, SessionRecord,
    DEFAULT_SESSION_TIMEOUT_SECS,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
