//! 会话记录
//!
//! 每个凭证身份对应一条记录，握手步骤成功后逐步填充：
//! `Empty → Installed → DeviceRegistered → SessionActive`。
//! 安装与设备注册不会过期，会话在超过服务端超时时间的一半后视为过期，
//! 只需重新执行会话创建步骤。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credential::Environment;

/// 服务端未返回 session_timeout 时的默认值（7 天）
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 604_800;

/// 握手状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Installed,
    DeviceRegistered,
    SessionActive,
    SessionExpired,
}

/// 持久化的会话记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

impl SessionRecord {
    pub fn empty(environment: Environment) -> Self {
        Self {
            environment,
            installation_token: None,
            server_public_key: None,
            device_id: None,
            session_token: None,
            session_created_at: None,
            session_timeout_secs: None,
            user_id: None,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installation_token.is_some()
    }

    pub fn has_device(&self) -> bool {
        self.device_id.is_some()
    }

    /// 会话超时秒数（缺省 7 天）
    pub fn timeout_secs(&self) -> u64 {
        self.session_timeout_secs.unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS)
    }

    /// 会话是否已过期
    ///
    /// 已用时间超过超时时间的 50% 即视为过期；没有会话也视为过期。
    pub fn is_session_expired(&self, now: DateTime<Utc>) -> bool {
        let (Some(_), Some(created_at)) = (&self.session_token, self.session_created_at) else {
            return true;
        };
        let elapsed_ms = (now - created_at).num_milliseconds();
        if elapsed_ms < 0 {
            return false;
        }
        let threshold_ms = i64::try_from(self.timeout_secs())
            .ok()
            .and_then(|secs| secs.checked_mul(500))
            .unwrap_or(i64::MAX);
        elapsed_ms > threshold_ms
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if !self.is_installed() {
            SessionState::Empty
        } else if !self.has_device() {
            SessionState::Installed
        } else if self.session_token.is_none() {
            SessionState::DeviceRegistered
        } else if self.is_session_expired(now) {
            SessionState::SessionExpired
        } else {
            SessionState::SessionActive
        }
    }

    /// 清除会话步骤的产物，保留安装与设备信息
    pub fn clear_session(&mut self) {
        self.session_token = None;
        self.session_created_at = None;
        self.session_timeout_secs = None;
        self.user_id = None;
    }

    /// 未过期时返回会话描述
    pub fn active_session(&self, now: DateTime<Utc>) -> Option<SessionDescriptor> {
        if self.is_session_expired(now) {
            return None;
        }
        Some(SessionDescriptor {
            session_token: self.session_token.clone()?,
            user_id: self.user_id?,
            environment: self.environment,
            session_timeout_secs: self.timeout_secs(),
        })
    }
}

/// 交给节点层的会话描述
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_token: String,
    pub user_id: i64,
    pub environment: Environment,
    pub session_timeout_secs: u64,
}

impl std::fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("session_token", &"***")
            .field("user_id", &self.user_id)
            .field("environment", &self.environment)
            .field("session_timeout_secs", &self.session_timeout_secs)
            .finish()
    }
}
