//! 错误类型模块
//!
//! 定义 bunq 会话、限流与 HTTP 客户端共用的错误类型。
//!
//! ## 模块结构
//! - `bunq_error`: 核心错误分类（配置错误、握手响应异常、API 调用失败等）

pub mod bunq_error;

pub use bunq_error::{ApiCallFailure, BunqError, BunqResult, HandshakeStep};
