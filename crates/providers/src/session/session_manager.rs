//! bunq 会话管理器
//!
//! 按凭证身份维护握手状态：安装 → 设备注册 → 创建会话。
//! 安装与设备注册结果长期有效，会话超过服务端超时的一半后只重跑创建会话一步。
//! 同一凭证的刷新通过单飞锁串行化，后到的调用等待前一次刷新完成后直接复用结果。

use bunqflow_core::{
    BunqError, BunqResult, Credential, HandshakeStep, SessionDescriptor, SessionRecord,
};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::{ApiRequest, BunqHttpClient};
use crate::handshake;
use bunqflow_credential::SharedSessionStore;

pub const INSTALLATION_PATH: &str = "/installation";
pub const DEVICE_SERVER_PATH: &str = "/device-server";
pub const SESSION_SERVER_PATH: &str = "/session-server";

pub struct SessionManager {
    store: SharedSessionStore,
    client: Arc<BunqHttpClient>,
    /// 每个凭证身份一把刷新锁
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(store: SharedSessionStore, client: Arc<BunqHttpClient>) -> Self {
        Self {
            store,
            client,
            refresh_locks: DashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<BunqHttpClient> {
        &self.client
    }

    fn refresh_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        self.refresh_locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 确保凭证有可用会话
    ///
    /// `force_recreate` 时清空记录并重跑全部三步；否则只补齐缺失或过期的步骤。
    /// 每一步成功后立即写回存储，失败时已完成的步骤保留。
    pub async fn ensure_session(
        &self,
        credential: &Credential,
        force_recreate: bool,
    ) -> BunqResult<SessionDescriptor> {
        let identity = credential.identity();
        let lock = self.refresh_lock(identity);
        let _guard = lock.lock().await;

        if force_recreate {
            tracing::info!("[SessionManager] 强制重建会话: credential={}", identity);
            self.store.clear(identity).await?;
        }

        let mut record = self.load_record(credential).await?;
        if let Some(descriptor) = record.active_session(Utc::now()) {
            tracing::debug!("[SessionManager] 复用缓存会话: credential={}", identity);
            return Ok(descriptor);
        }
        if record.session_token.is_some() {
            tracing::info!(
                "[SessionManager] 会话已过期，重新创建: credential={}, timeout={}s",
                identity,
                record.timeout_secs()
            );
        }

        if !record.is_installed() || record.server_public_key.is_none() {
            self.install(credential, &mut record).await?;
        }
        if !record.has_device() {
            self.register_device(credential, &mut record).await?;
        }
        self.create_session(credential, &mut record).await
    }

    /// 丢弃缓存会话，保留安装与设备，下次调用只重跑创建会话
    pub async fn invalidate_session(&self, credential: &Credential) -> BunqResult<()> {
        let identity = credential.identity();
        let lock = self.refresh_lock(identity);
        let _guard = lock.lock().await;

        if let Some(mut record) = self.store.load(identity).await? {
            record.clear_session();
            self.store.save(identity, &record).await?;
            tracing::info!("[SessionManager] 会话已失效: credential={}", identity);
        }
        Ok(())
    }

    /// 删除凭证的全部握手记录
    pub async fn reset(&self, credential: &Credential) -> BunqResult<()> {
        let identity = credential.identity();
        let lock = self.refresh_lock(identity);
        let _guard = lock.lock().await;
        self.store.clear(identity).await
    }

    /// 读取当前记录（不触发握手）
    pub async fn record(&self, credential: &Credential) -> BunqResult<Option<SessionRecord>> {
        self.store.load(credential.identity()).await
    }

    async fn load_record(&self, credential: &Credential) -> BunqResult<SessionRecord> {
        let environment = credential.environment();
        match self.store.load(credential.identity()).await? {
            Some(record) if record.environment == environment => Ok(record),
            Some(record) => {
                tracing::warn!(
                    "[SessionManager] 记录环境不一致，重新握手: credential={}, stored={}, current={}",
                    credential.identity(),
                    record.environment,
                    environment
                );
                Ok(SessionRecord::empty(environment))
            }
            None => Ok(SessionRecord::empty(environment)),
        }
    }

    async fn install(&self, credential: &Credential, record: &mut SessionRecord) -> BunqResult<()> {
        tracing::info!("[SessionManager] 注册安装: credential={}", credential.identity());
        let body = json!({ "client_public_key": credential.public_key_pem() });
        let response = self
            .client
            .request(credential, ApiRequest::post(INSTALLATION_PATH, body))
            .await?;
        let installation = handshake::parse_installation(&response)?;

        // 新安装使旧设备与会话失效
        *record = SessionRecord::empty(credential.environment());
        record.installation_token = Some(installation.token);
        record.server_public_key = Some(installation.server_public_key);
        self.store.save(credential.identity(), record).await
    }

    async fn register_device(
        &self,
        credential: &Credential,
        record: &mut SessionRecord,
    ) -> BunqResult<()> {
        let installation_token = installation_token(record, HandshakeStep::DeviceRegistration)?;
        tracing::info!(
            "[SessionManager] 注册设备: credential={}, mode={}",
            credential.identity(),
            credential.auth_mode()
        );

        let config = self.client.config();
        let mut body = json!({
            "description": config.device_description,
            "secret": credential.secret(),
        });
        if !config.permitted_ips.is_empty() {
            body["permitted_ips"] = Value::from(config.permitted_ips.clone());
        }

        let response = self
            .client
            .request(
                credential,
                ApiRequest::post(DEVICE_SERVER_PATH, body).with_token(installation_token),
            )
            .await?;
        record.device_id = Some(handshake::parse_device_registration(&response)?);
        self.store.save(credential.identity(), record).await
    }

    async fn create_session(
        &self,
        credential: &Credential,
        record: &mut SessionRecord,
    ) -> BunqResult<SessionDescriptor> {
        let installation_token = installation_token(record, HandshakeStep::SessionCreation)?;
        tracing::info!("[SessionManager] 创建会话: credential={}", credential.identity());

        record.clear_session();
        let body = json!({ "secret": credential.secret() });
        let response = self
            .client
            .request(
                credential,
                ApiRequest::post(SESSION_SERVER_PATH, body).with_token(installation_token),
            )
            .await?;
        let session = handshake::parse_session_server(&response)?;

        record.session_token = Some(session.token.clone());
        record.session_created_at = Some(Utc::now());
        record.session_timeout_secs = session.session_timeout_secs;
        record.user_id = Some(session.user_id);
        self.store.save(credential.identity(), record).await?;

        tracing::info!(
            "[SessionManager] 会话已建立: credential={}, user_id={}, timeout={}s",
            credential.identity(),
            session.user_id,
            record.timeout_secs()
        );
        Ok(SessionDescriptor {
            session_token: session.token,
            user_id: session.user_id,
            environment: record.environment,
            session_timeout_secs: record.timeout_secs(),
        })
    }
}

fn installation_token(record: &SessionRecord, step: HandshakeStep) -> BunqResult<String> {
    record
        .installation_token
        .clone()
        .ok_or_else(|| BunqError::malformed(step, "缺少安装 token"))
}
