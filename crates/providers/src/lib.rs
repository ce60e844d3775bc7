//! bunq API 接入
//!
//! ## 模块结构
//!
//! - `rate_limit` - 按凭证与端点类别限流
//! - `transport` - HTTP 传输层
//! - `client` - 签名、标准请求头与错误补充
//! - `handshake` - 握手响应解码
//! - `session` - 会话生命周期管理
//! - `pagination` - 列表分页遍历

pub mod client;
pub mod handshake;
pub mod pagination;
pub mod rate_limit;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ApiRequest, BunqHttpClient};
pub use pagination::{paginate, PageOptions};
pub use rate_limit::{EndpointClass, RateLimiter};
pub use session::SessionManager;
pub use transport::{HttpTransport, ReqwestTransport, TransportRequest, TransportResponse};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
