//! bunq HTTP 客户端
//!
//! 每次调用：生成请求 ID → 限流 → 组装标准请求头 → 有请求体时签名 →
//! 发送 → 非 2xx 时补充服务端关联信息后返回 `ApiCallFailed`。

use bunqflow_core::config::ClientConfig;
use bunqflow_core::logger::sanitize_log_message;
use bunqflow_core::{signer, ApiCallFailure, BunqError, BunqResult, Credential, HttpMethod};
use serde_json::Value;
use std::sync::Arc;

use crate::rate_limit::RateLimiter;
use crate::transport::{HttpTransport, TransportRequest, TransportResponse};

pub const HEADER_REQUEST_ID: &str = "X-Bunq-Client-Request-Id";
pub const HEADER_AUTHENTICATION: &str = "X-Bunq-Client-Authentication";
pub const HEADER_SIGNATURE: &str = "X-Bunq-Client-Signature";
pub const HEADER_LANGUAGE: &str = "X-Bunq-Language";
pub const HEADER_REGION: &str = "X-Bunq-Region";
pub const HEADER_GEOLOCATION: &str = "X-Bunq-Geolocation";
pub const HEADER_RESPONSE_ID: &str = "X-Bunq-Client-Response-Id";

/// 响应体无法转成文本时的占位
const UNREADABLE_BODY: &str = "<unreadable response body>";

/// 一次 API 调用
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
    /// 会话 token 或（握手阶段）安装 token
    pub auth_token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            auth_token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// 带限流与签名的 bunq 客户端
pub struct BunqHttpClient {
    transport: Arc<dyn HttpTransport>,
    rate_limiter: Arc<RateLimiter>,
    config: ClientConfig,
}

impl BunqHttpClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        rate_limiter: Arc<RateLimiter>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            rate_limiter,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// 发送请求并解析 JSON 响应（空响应体返回 `Value::Null`）
    pub async fn request(&self, credential: &Credential, request: ApiRequest) -> BunqResult<Value> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let endpoint = endpoint_of(&request.path);

        self.rate_limiter
            .acquire(credential.identity(), request.method, &request.path)
            .await?;

        let mut headers = self.standard_headers(&request_id);
        if let Some(token) = &request.auth_token {
            headers.push((HEADER_AUTHENTICATION.to_string(), token.clone()));
        }

        let body = match &request.body {
            Some(value) => {
                let bytes = serde_json::to_vec(value).map_err(|e| BunqError::Decode {
                    endpoint: endpoint.clone(),
                    message: format!("请求体序列化失败: {e}"),
                })?;
                let signature = signer::sign(&bytes, credential.private_key_pem())?;
                headers.push((HEADER_SIGNATURE.to_string(), signature));
                Some(bytes)
            }
            None => None,
        };

        let url = build_url(credential.environment().base_url(), &request.path);
        tracing::debug!(
            "[HttpClient] {} {} request_id={}",
            request.method,
            endpoint,
            request_id
        );

        let response = self
            .transport
            .send(TransportRequest {
                method: request.method,
                url,
                headers,
                body,
            })
            .await
            .inspect_err(|e| {
                tracing::warn!("[HttpClient] 请求未完成: request_id={request_id}, error={e}");
            })?;

        if !response.is_success() {
            let failure = build_failure(&request, &endpoint, &request_id, &response);
            tracing::warn!(
                "[HttpClient] API 调用失败: status={}, endpoint={}, request_id={}, response_id={}, body={}",
                failure.status_code,
                failure.endpoint,
                failure.request_id,
                failure.provider_response_id.as_deref().unwrap_or("-"),
                sanitize_log_message(&failure.response_body)
            );
            return Err(failure.into());
        }

        if response.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&response.body).map_err(|e| BunqError::Decode {
            endpoint,
            message: e.to_string(),
        })
    }

    fn standard_headers(&self, request_id: &str) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
            (HEADER_LANGUAGE.to_string(), self.config.language.clone()),
            (HEADER_REGION.to_string(), self.config.region.clone()),
            (HEADER_GEOLOCATION.to_string(), self.config.geolocation.clone()),
            (HEADER_REQUEST_ID.to_string(), request_id.to_string()),
        ]
    }
}

/// 拼接完整 URL；路径可以是完整 URL、带或不带 `/v1` 前缀的相对路径
pub fn build_url(base_url: &str, path: &str) -> String {
    if path.starts_with("https://") || path.starts_with("http://") {
        return path.to_string();
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let path = match path.strip_prefix("/v1/") {
        Some(rest) => format!("/{rest}"),
        None => path,
    };
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn endpoint_of(path: &str) -> String {
    path.split(['?', '#']).next().unwrap_or_default().to_string()
}

fn build_failure(
    request: &ApiRequest,
    endpoint: &str,
    request_id: &str,
    response: &TransportResponse,
) -> ApiCallFailure {
    let response_body = match std::str::from_utf8(&response.body) {
        Ok(text) => text.to_string(),
        Err(_) => UNREADABLE_BODY.to_string(),
    };
    let message =
        provider_error_description(&response_body).unwrap_or_else(|| status_text(response.status));

    ApiCallFailure {
        status_code: response.status,
        provider_response_id: response.header(HEADER_RESPONSE_ID).map(str::to_string),
        request_id: request_id.to_string(),
        method: request.method.to_string(),
        endpoint: endpoint.to_string(),
        message,
        response_body,
        timestamp: response.header("date").map(str::to_string),
    }
}

/// 提取 `{"Error":[{"error_description": ...}]}` 中的描述
fn provider_error_description(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let descriptions: Vec<&str> = value
        .get("Error")?
        .as_array()?
        .iter()
        .filter_map(|e| e.get("error_description").and_then(Value::as_str))
        .collect();
    if descriptions.is_empty() {
        None
    } else {
        Some(descriptions.join("; "))
    }
}

fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(|reason| format!("HTTP {status} {reason}"))
        .unwrap_or_else(|| format!("HTTP {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_credential, ScriptedTransport};
    use bunqflow_core::signer;
    use serde_json::json;

    fn client(transport: Arc<ScriptedTransport>) -> BunqHttpClient {
        BunqHttpClient::new(
            transport,
            Arc::new(RateLimiter::new()),
            ClientConfig::default(),
        )
    }

    #[test]
    fn test_build_url() {
        let base = "https://api.bunq.com/v1";
        assert_eq!(build_url(base, "/user/1"), "https://api.bunq.com/v1/user/1");
        assert_eq!(build_url(base, "user/1"), "https://api.bunq.com/v1/user/1");
        assert_eq!(
            build_url(base, "/v1/user/1/payment?older_id=5"),
            "https://api.bunq.com/v1/user/1/payment?older_id=5"
        );
        assert_eq!(
            build_url(base, "https://example.com/x"),
            "https://example.com/x"
        );
    }

    #[tokio::test]
    async fn test_standard_headers_and_signature() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            ScriptedTransport::json(200, json!({"Response": [{"Id": {"id": 1}}]}))
        }));
        let client = client(transport.clone());
        let credential = test_credential("cred-a");

        let body = json!({"amount": {"value": "1.00", "currency": "EUR"}});
        client
            .request(
                &credential,
                ApiRequest::post("/user/1/monetary-account/2/payment", body).with_token("sess"),
            )
            .await
            .unwrap();
        client
            .request(&credential, ApiRequest::get("/user/1"))
            .await
            .unwrap();

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        let post = &sent[0];
        assert_eq!(post.header("Content-Type"), Some("application/json"));
        assert_eq!(post.header("Cache-Control"), Some("no-cache"));
        assert_eq!(post.header(HEADER_LANGUAGE), Some("en_US"));
        assert_eq!(post.header(HEADER_AUTHENTICATION), Some("sess"));
        assert!(post.header("User-Agent").unwrap().starts_with("bunqflow/"));

        // 签名覆盖实际发送的字节
        let signature = post.header(HEADER_SIGNATURE).unwrap();
        let bytes = post.body.as_ref().unwrap();
        assert!(signer::verify(bytes, signature, credential.public_key_pem()).unwrap());

        let get = &sent[1];
        assert!(get.header(HEADER_SIGNATURE).is_none());
        assert!(get.header(HEADER_AUTHENTICATION).is_none());
        assert_ne!(get.header(HEADER_REQUEST_ID), post.header(HEADER_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_failure_is_enriched() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            let mut response = ScriptedTransport::json(
                400,
                json!({"Error": [{"error_description": "User credentials are incorrect."}]}),
            );
            response
                .headers
                .insert("x-bunq-client-response-id".to_string(), "resp-9".to_string());
            response
                .headers
                .insert("date".to_string(), "Mon, 19 Oct 2026 10:00:00 GMT".to_string());
            response
        }));
        let client = client(transport.clone());
        let err = client
            .request(&test_credential("cred-b"), ApiRequest::get("/user?x=1"))
            .await
            .unwrap_err();

        let failure = err.api_failure().unwrap();
        assert_eq!(failure.status_code, 400);
        assert_eq!(failure.provider_response_id.as_deref(), Some("resp-9"));
        assert_eq!(failure.endpoint, "/user");
        assert_eq!(failure.method, "GET");
        assert_eq!(failure.message, "User credentials are incorrect.");
        assert_eq!(
            failure.timestamp.as_deref(),
            Some("Mon, 19 Oct 2026 10:00:00 GMT")
        );
        let sent_request_id = transport.requests()[0]
            .header(HEADER_REQUEST_ID)
            .unwrap()
            .to_string();
        assert_eq!(failure.request_id, sent_request_id);
    }

    #[tokio::test]
    async fn test_unreadable_body_degrades_to_placeholder() {
        let transport = Arc::new(ScriptedTransport::new(|_| TransportResponse {
            status: 502,
            headers: Default::default(),
            body: vec![0xff, 0xfe, 0x00],
        }));
        let err = client(transport)
            .request(&test_credential("cred-c"), ApiRequest::get("/user"))
            .await
            .unwrap_err();
        let failure = err.api_failure().unwrap();
        assert_eq!(failure.response_body, UNREADABLE_BODY);
        assert_eq!(failure.message, "HTTP 502 Bad Gateway");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_and_invalid_success_body() {
        let transport = Arc::new(ScriptedTransport::new(|request| TransportResponse {
            status: 200,
            headers: Default::default(),
            body: if request.method == HttpMethod::Delete {
                Vec::new()
            } else {
                b"<html>".to_vec()
            },
        }));
        let client = client(transport);
        let credential = test_credential("cred-d");

        let value = client
            .request(&credential, ApiRequest::delete("/user/1/x/2"))
            .await
            .unwrap();
        assert!(value.is_null());

        let err = client
            .request(&credential, ApiRequest::get("/user/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, BunqError::Decode { .. }));
    }
}
