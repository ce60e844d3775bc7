//! 测试用传输层
//!
//! - `ScriptedTransport`: 按闭包返回响应并记录所有请求
//! - `FakeBunq`: 模拟 bunq 握手端点（安装、设备注册、创建会话），
//!   校验安装 token 与请求签名，其余路径交给可选的回调处理

use async_trait::async_trait;
use bunqflow_core::signer::{self, KeyPair, DEFAULT_KEY_BITS};
use bunqflow_core::{AuthMode, BunqResult, Credential, Environment, HttpMethod};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::client::{HEADER_AUTHENTICATION, HEADER_SIGNATURE};
use crate::rate_limit::normalize_path;
use crate::transport::{HttpTransport, TransportRequest, TransportResponse};

type Responder = dyn Fn(&TransportRequest) -> TransportResponse + Send + Sync;

/// 测试共用的 RSA 密钥对（生成较慢，只生成一次）
pub fn test_key_pair() -> &'static KeyPair {
    static KEYS: OnceLock<KeyPair> = OnceLock::new();
    KEYS.get_or_init(|| signer::generate_key_pair(DEFAULT_KEY_BITS).expect("生成测试密钥失败"))
}

pub fn test_credential(identity: &str) -> Credential {
    test_credential_with(identity, AuthMode::ApiKey, Environment::Sandbox)
}

pub fn test_credential_with(
    identity: &str,
    auth_mode: AuthMode,
    environment: Environment,
) -> Credential {
    let keys = test_key_pair();
    Credential::new(
        identity,
        auth_mode,
        environment,
        format!("secret-{identity}"),
        keys.private_key_pem.clone(),
        keys.public_key_pem.clone(),
    )
    .expect("测试凭证无效")
}

pub fn json_response(status: u16, value: Value) -> TransportResponse {
    TransportResponse {
        status,
        headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
        body: serde_json::to_vec(&value).unwrap_or_default(),
    }
}

/// 按闭包响应的传输层
pub struct ScriptedTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<TransportRequest>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new(
        responder: impl Fn(&TransportRequest) -> TransportResponse + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn json(status: u16, value: Value) -> TransportResponse {
        json_response(status, value)
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    /// 请求的 URL 列表（去掉域名和 /v1）
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| path_and_query(&r.url))
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: TransportRequest) -> BunqResult<TransportResponse> {
        self.requests.lock().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok((self.responder)(&request))
    }
}

fn path_and_query(url: &str) -> String {
    let without_host = match url::Url::parse(url) {
        Ok(parsed) => match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        },
        Err(_) => url.to_string(),
    };
    match without_host.strip_prefix("/v1") {
        Some(rest) => rest.to_string(),
        None => without_host,
    }
}

/// 一次性注入的失败响应
struct InjectedFailure {
    path: String,
    response: TransportResponse,
}

/// 模拟 bunq 握手
pub struct FakeBunq {
    user_id: i64,
    session_timeout: Mutex<Option<u64>>,
    latency: Option<Duration>,
    client_public_key: Mutex<Option<String>>,
    installation_token: Mutex<Option<String>>,
    installations: AtomicUsize,
    device_registrations: AtomicUsize,
    session_creations: AtomicUsize,
    counter: AtomicUsize,
    failures: Mutex<Vec<InjectedFailure>>,
    fallback: Option<Box<Responder>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl FakeBunq {
    pub fn new() -> Self {
        Self {
            user_id: 4242,
            session_timeout: Mutex::new(Some(3600)),
            latency: None,
            client_public_key: Mutex::new(None),
            installation_token: Mutex::new(None),
            installations: AtomicUsize::new(0),
            device_registrations: AtomicUsize::new(0),
            session_creations: AtomicUsize::new(0),
            counter: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 握手响应中的 session_timeout（None 表示不返回）
    pub fn with_session_timeout(self, timeout: Option<u64>) -> Self {
        *self.session_timeout.lock() = timeout;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 非握手路径的响应
    pub fn with_fallback(
        mut self,
        responder: impl Fn(&TransportRequest) -> TransportResponse + Send + Sync + 'static,
    ) -> Self {
        self.fallback = Some(Box::new(responder));
        self
    }

    /// 下一次访问 `path` 时返回给定响应
    pub fn inject(&self, path: &str, response: TransportResponse) {
        self.failures.lock().push(InjectedFailure {
            path: path.to_string(),
            response,
        });
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn installations(&self) -> usize {
        self.installations.load(Ordering::SeqCst)
    }

    pub fn device_registrations(&self) -> usize {
        self.device_registrations.load(Ordering::SeqCst)
    }

    pub fn session_creations(&self) -> usize {
        self.session_creations.load(Ordering::SeqCst)
    }

    pub fn handshake_calls(&self) -> usize {
        self.installations() + self.device_registrations() + self.session_creations()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    fn next_token(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n:04}")
    }

    fn take_injected(&self, path: &str) -> Option<TransportResponse> {
        let mut failures = self.failures.lock();
        let index = failures.iter().position(|f| f.path == path)?;
        Some(failures.remove(index).response)
    }

    fn body_json(request: &TransportRequest) -> Value {
        request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_slice(b).ok())
            .unwrap_or(Value::Null)
    }

    /// 校验安装 token 与签名
    fn check_signed(&self, request: &TransportRequest) -> Option<TransportResponse> {
        let expected_token = self.installation_token.lock().clone();
        if expected_token.is_none() || request.header(HEADER_AUTHENTICATION) != expected_token.as_deref()
        {
            return Some(error_response(401, "Insufficient authorisation."));
        }
        let public_key = self.client_public_key.lock().clone()?;
        let (Some(signature), Some(body)) = (request.header(HEADER_SIGNATURE), request.body.as_deref())
        else {
            return Some(error_response(400, "Request signature is required."));
        };
        match signer::verify(body, signature, &public_key) {
            Ok(true) => None,
            _ => Some(error_response(400, "Request signature is invalid.")),
        }
    }

    fn handle(&self, request: &TransportRequest) -> TransportResponse {
        let path = normalize_path(&request.url);
        if let Some(response) = self.take_injected(&path) {
            return response;
        }

        match (request.method, path.as_str()) {
            (HttpMethod::Post, "/installation") => {
                self.installations.fetch_add(1, Ordering::SeqCst);
                let body = Self::body_json(request);
                let Some(key) = body.get("client_public_key").and_then(Value::as_str) else {
                    return error_response(400, "client_public_key is required.");
                };
                *self.client_public_key.lock() = Some(key.to_string());
                let token = self.next_token("installation");
                *self.installation_token.lock() = Some(token.clone());
                json_response(
                    200,
                    json!({"Response": [
                        {"Id": {"id": 1}},
                        {"Token": {"id": 2, "token": token}},
                        {"ServerPublicKey": {"server_public_key": "-----BEGIN PUBLIC KEY-----\nSERVER\n-----END PUBLIC KEY-----"}}
                    ]}),
                )
            }
            (HttpMethod::Post, "/device-server") => {
                self.device_registrations.fetch_add(1, Ordering::SeqCst);
                if let Some(rejection) = self.check_signed(request) {
                    return rejection;
                }
                let id = 100 + self.device_registrations() as i64;
                json_response(200, json!({"Response": [{"Id": {"id": id}}]}))
            }
            (HttpMethod::Post, "/session-server") => {
                self.session_creations.fetch_add(1, Ordering::SeqCst);
                if let Some(rejection) = self.check_signed(request) {
                    return rejection;
                }
                let mut user = json!({"id": self.user_id, "display_name": "Test User"});
                if let Some(timeout) = *self.session_timeout.lock() {
                    user["session_timeout"] = json!(timeout);
                }
                json_response(
                    200,
                    json!({"Response": [
                        {"Id": {"id": 9}},
                        {"Token": {"id": 10, "token": self.next_token("session")}},
                        {"UserPerson": user}
                    ]}),
                )
            }
            _ => match &self.fallback {
                Some(fallback) => fallback(request),
                None => error_response(404, "Route not found."),
            },
        }
    }
}

impl Default for FakeBunq {
    fn default() -> Self {
        Self::new()
    }
}

pub fn error_response(status: u16, description: &str) -> TransportResponse {
    json_response(
        status,
        json!({"Error": [{"error_description": description, "error_description_translated": description}]}),
    )
}

#[async_trait]
impl HttpTransport for FakeBunq {
    async fn send(&self, request: TransportRequest) -> BunqResult<TransportResponse> {
        self.requests.lock().push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(self.handle(&request))
    }
}

/// 便捷构造：共享 FakeBunq + 限流器 + 客户端
pub fn fake_client(
    fake: Arc<FakeBunq>,
) -> (Arc<crate::client::BunqHttpClient>, Arc<crate::rate_limit::RateLimiter>) {
    let limiter = Arc::new(crate::rate_limit::RateLimiter::new());
    let client = Arc::new(crate::client::BunqHttpClient::new(
        fake,
        limiter.clone(),
        bunqflow_core::config::ClientConfig::default(),
    ));
    (client, limiter)
}
