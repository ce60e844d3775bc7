//! 配置加载
//!
//! YAML 配置文件，默认位于 `<config_dir>/bunqflow/config.yaml`，
//! 文件不存在时使用默认值。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{BunqError, BunqResult};
use crate::models::{AuthMode, Credential, Environment};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientConfig,
    pub session_store: SessionStoreConfig,
    pub logging: LoggingConfig,
    pub credentials: Vec<CredentialConfig>,
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub language: String,
    pub region: String,
    pub geolocation: String,
    /// 仅作用于底层 reqwest 客户端
    pub timeout_secs: u64,
    pub device_description: String,
    /// 为空时设备注册不携带 permitted_ips
    pub permitted_ips: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("bunqflow/{}", env!("CARGO_PKG_VERSION")),
            language: "en_US".to_string(),
            region: "nl_NL".to_string(),
            geolocation: "0 0 0 0 000".to_string(),
            timeout_secs: 30,
            device_description: "bunqflow".to_string(),
            permitted_ips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreKind {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoreConfig {
    pub kind: SessionStoreKind,
    pub path: PathBuf,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            kind: SessionStoreKind::default(),
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("bunqflow")
                .join("sessions.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing 过滤级别，可被 RUST_LOG 覆盖
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 配置文件中的凭证
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    pub id: Option<String>,
    pub environment: String,
    pub auth_mode: Option<AuthMode>,
    pub api_key: Option<String>,
    pub oauth_access_token: Option<String>,
    pub private_key_pem: Option<String>,
    pub public_key_pem: Option<String>,
}

impl CredentialConfig {
    /// 选择认证模式
    ///
    /// 显式 OAuth 或配置了 access token 字段时走 OAuth，token 缺失直接报错，
    /// 不会退回 API Key。
    pub fn resolve_auth(&self) -> BunqResult<(AuthMode, String)> {
        let oauth_configured =
            self.auth_mode == Some(AuthMode::OAuth) || self.oauth_access_token.is_some();

        if oauth_configured && self.auth_mode != Some(AuthMode::ApiKey) {
            let token = non_blank(self.oauth_access_token.as_deref()).ok_or_else(|| {
                BunqError::configuration("已选择 OAuth 认证，但没有可用的 access token")
            })?;
            return Ok((AuthMode::OAuth, token.to_string()));
        }

        let api_key = non_blank(self.api_key.as_deref())
            .ok_or_else(|| BunqError::configuration("缺少 API Key"))?;
        Ok((AuthMode::ApiKey, api_key.to_string()))
    }

    pub fn resolve(&self) -> BunqResult<Credential> {
        let environment: Environment = self.environment.parse()?;
        let (auth_mode, secret) = self.resolve_auth()?;
        let identity = match non_blank(self.id.as_deref()) {
            Some(id) => id.to_string(),
            None => Credential::derive_identity(environment, &secret),
        };
        let private_key_pem = non_blank(self.private_key_pem.as_deref())
            .ok_or_else(|| BunqError::configuration("缺少 private_key_pem"))?;
        let public_key_pem = non_blank(self.public_key_pem.as_deref())
            .ok_or_else(|| BunqError::configuration("缺少 public_key_pem"))?;

        Credential::new(
            identity,
            auth_mode,
            environment,
            secret,
            private_key_pem,
            public_key_pem,
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bunqflow")
        .join("config.yaml")
}

pub fn load_config(path: &Path) -> BunqResult<AppConfig> {
    if !path.exists() {
        tracing::debug!("[Config] 配置文件不存在，使用默认配置: {}", path.display());
        return Ok(AppConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| BunqError::configuration(format!("读取配置失败 {}: {e}", path.display())))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> BunqResult<AppConfig> {
    serde_yaml::from_str(content)
        .map_err(|e| BunqError::configuration(format!("配置格式错误: {e}")))
}
