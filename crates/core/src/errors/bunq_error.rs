//! bunq 统一错误模型
//!
//! 会话管理器与 HTTP 客户端只负责补充上下文并向上抛出错误，
//! 是否重试、是否跳过当前条目由调用方决定。限流永远不是错误，只会等待。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 握手步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeStep {
    Installation,
    DeviceRegistration,
    SessionCreation,
}

impl std::fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeStep::Installation => write!(f, "installation"),
            HandshakeStep::DeviceRegistration => write!(f, "device-server"),
            HandshakeStep::SessionCreation => write!(f, "session-server"),
        }
    }
}

/// 非 2xx 响应的诊断信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallFailure {
    pub status_code: u16,
    /// 服务端返回的 X-Bunq-Client-Response-Id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response_id: Option<String>,
    /// 本次请求生成的 X-Bunq-Client-Request-Id
    pub request_id: String,
    pub method: String,
    pub endpoint: String,
    /// 服务端 error_description，缺失时为 HTTP 状态文本
    pub message: String,
    pub response_body: String,
    /// 服务端 Date 头
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ApiCallFailure {
    /// 是否可由调用方重试
    pub fn retryable(&self) -> bool {
        matches!(self.status_code, 429 | 500..=599)
    }
}

impl std::fmt::Display for ApiCallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} 返回 {}: {} (request_id={}, response_id={})",
            self.method,
            self.endpoint,
            self.status_code,
            self.message,
            self.request_id,
            self.provider_response_id.as_deref().unwrap_or("-")
        )
    }
}

/// 核心错误
#[derive(Error, Debug)]
pub enum BunqError {
    /// 凭证或配置无效（不重试）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 握手响应缺少预期的结构化内容
    #[error("握手响应异常 ({step}): {detail}")]
    MalformedHandshakeResponse { step: HandshakeStep, detail: String },

    /// 服务端返回非 2xx
    #[error("API 调用失败: {0}")]
    ApiCallFailed(Box<ApiCallFailure>),

    /// 请求未得到 HTTP 响应
    #[error("网络请求失败 ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },

    /// 2xx 响应体无法解析
    #[error("响应解析失败 ({endpoint}): {message}")]
    Decode { endpoint: String, message: String },

    /// 签名失败
    #[error("签名失败: {0}")]
    Signing(String),

    /// 会话存储读写失败
    #[error("会话存储错误: {0}")]
    Store(String),
}

pub type BunqResult<T> = Result<T, BunqError>;

impl BunqError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn malformed(step: HandshakeStep, detail: impl Into<String>) -> Self {
        Self::MalformedHandshakeResponse {
            step,
            detail: detail.into(),
        }
    }

    /// 是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ApiCallFailed(failure) => failure.retryable(),
            Self::Transport { .. } => true,
            _ => false,
        }
    }

    /// API 失败详情
    pub fn api_failure(&self) -> Option<&ApiCallFailure> {
        match self {
            Self::ApiCallFailed(failure) => Some(failure),
            _ => None,
        }
    }

    /// HTTP 状态码（仅 ApiCallFailed）
    pub fn status_code(&self) -> Option<u16> {
        self.api_failure().map(|f| f.status_code)
    }
}

impl From<ApiCallFailure> for BunqError {
    fn from(failure: ApiCallFailure) -> Self {
        Self::ApiCallFailed(Box::new(failure))
    }
}

impl From<openssl::error::ErrorStack> for BunqError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        Self::Signing(err.to_string())
    }
}

impl From<BunqError> for String {
    fn from(err: BunqError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(status_code: u16) -> ApiCallFailure {
        ApiCallFailure {
            status_code,
            provider_response_id: Some("resp_1".to_string()),
            request_id: "req_1".to_string(),
            method: "POST".to_string(),
            endpoint: "/session-server".to_string(),
            message: "Insufficient authorisation.".to_string(),
            response_body: "{}".to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn test_retryable_status_codes() {
        assert!(BunqError::from(failure(429)).is_retryable());
        assert!(BunqError::from(failure(503)).is_retryable());
        assert!(!BunqError::from(failure(401)).is_retryable());
        assert!(!BunqError::configuration("bad").is_retryable());
        assert!(!BunqError::malformed(HandshakeStep::Installation, "no Token").is_retryable());
    }

    #[test]
    fn test_api_failure_display_keeps_correlation_ids() {
        let err = BunqError::from(failure(401));
        let text = err.to_string();
        assert!(text.contains("req_1"));
        assert!(text.contains("resp_1"));
        assert!(text.contains("Insufficient authorisation."));
        assert_eq!(err.status_code(), Some(401));
    }

    #[test]
    fn test_handshake_step_display() {
        assert_eq!(HandshakeStep::SessionCreation.to_string(), "session-server");
        let err = BunqError::malformed(HandshakeStep::DeviceRegistration, "缺少 Id");
        assert!(err.to_string().contains("device-server"));
    }
}
