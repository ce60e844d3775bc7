//! 节点执行上下文
//!
//! 每个节点操作显式接收 `ExecutionContext`，其中持有凭证、HTTP 客户端和会话管理器。

use bunqflow_core::config::AppConfig;
use bunqflow_core::{BunqResult, Credential, SessionDescriptor};
use bunqflow_credential::open_session_store;
use bunqflow_providers::{
    paginate, ApiRequest, BunqHttpClient, PageOptions, RateLimiter, ReqwestTransport,
    SessionManager,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 进程级共享组件：限流窗口与会话记录在所有执行之间共享
pub fn build_session_manager(config: &AppConfig) -> BunqResult<Arc<SessionManager>> {
    let transport = Arc::new(ReqwestTransport::new(Duration::from_secs(
        config.client.timeout_secs,
    ))?);
    let client = Arc::new(BunqHttpClient::new(
        transport,
        Arc::new(RateLimiter::new()),
        config.client.clone(),
    ));
    let store = open_session_store(&config.session_store)?;
    Ok(Arc::new(SessionManager::new(store, client)))
}

#[derive(Clone)]
pub struct ExecutionContext {
    credential: Credential,
    http: Arc<BunqHttpClient>,
    sessions: Arc<SessionManager>,
}

impl ExecutionContext {
    pub fn new(credential: Credential, sessions: Arc<SessionManager>) -> Self {
        Self {
            credential,
            http: sessions.client().clone(),
            sessions,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn http(&self) -> &Arc<BunqHttpClient> {
        &self.http
    }

    /// 获取可用会话（必要时完成握手）
    pub async fn session(&self) -> BunqResult<SessionDescriptor> {
        self.sessions.ensure_session(&self.credential, false).await
    }

    /// 以会话 token 调用业务接口
    pub async fn call(&self, request: ApiRequest) -> BunqResult<Value> {
        let session = self.session().await?;
        self.http
            .request(&self.credential, request.with_token(session.session_token))
            .await
    }

    /// 遍历列表接口
    pub async fn list(&self, path: &str, options: &PageOptions) -> BunqResult<Vec<Value>> {
        let session = self.session().await?;
        paginate(
            &self.http,
            &self.credential,
            &session.session_token,
            path,
            options,
        )
        .await
    }

    /// `/user/{user_id}` 前缀
    pub async fn user_path(&self, suffix: &str) -> BunqResult<String> {
        let session = self.session().await?;
        Ok(format!("/user/{}{}", session.user_id, suffix))
    }
}
