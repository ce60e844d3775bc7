//! bunqflow - 工作流自动化中的 bunq 节点
//!
//! ## Workspace 结构
//!
//! - bunqflow-core crate（模型、错误、配置、日志、签名）
//! - bunqflow-credential crate（会话存储）
//! - bunqflow-providers crate（限流、HTTP 客户端、会话管理、分页）
//! - 主 crate 提供节点层操作：账户、付款、回调与批量执行

pub mod accounts;
pub mod batch;
pub mod callbacks;
pub mod context;
pub mod models;
pub mod payments;

pub use batch::{run_items, ItemOutcome};
pub use context::{build_session_manager, ExecutionContext};
pub use models::{Amount, MonetaryAccount, NotificationFilter, Payment, PaymentRequest, Pointer};

pub use bunqflow_core::{BunqError, BunqResult, Credential, SessionDescriptor};
pub use bunqflow_providers::PageOptions;
