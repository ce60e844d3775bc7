//! 凭证模型
//!
//! 一组凭证由身份标识、认证模式、环境、密钥（API Key 或 OAuth access token）
//! 以及客户端 RSA 密钥对组成。环境决定 API 主机，会话期间不会切换。

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::errors::{BunqError, BunqResult};

const SANDBOX_BASE_URL: &str = "https://public-api.sandbox.bunq.com/v1";
const PRODUCTION_BASE_URL: &str = "https://api.bunq.com/v1";

/// bunq 环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    /// API 基础地址（包含 /v1）
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_BASE_URL,
            Environment::Production => PRODUCTION_BASE_URL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = BunqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Environment::Sandbox),
            "production" | "live" => Ok(Environment::Production),
            other => Err(BunqError::configuration(format!("未知的环境: {other:?}"))),
        }
    }
}

/// 认证模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::ApiKey => write!(f, "api_key"),
            AuthMode::OAuth => write!(f, "oauth"),
        }
    }
}

/// 已解析的凭证
///
/// `secret` 在 API Key 模式下是 API Key，在 OAuth 模式下是 access token，
/// 两种模式的握手流程完全一致。
#[derive(Clone)]
pub struct Credential {
    identity: String,
    auth_mode: AuthMode,
    environment: Environment,
    secret: String,
    private_key_pem: String,
    public_key_pem: String,
}

impl Credential {
    pub fn new(
        identity: impl Into<String>,
        auth_mode: AuthMode,
        environment: Environment,
        secret: impl Into<String>,
        private_key_pem: impl Into<String>,
        public_key_pem: impl Into<String>,
    ) -> BunqResult<Self> {
        let identity = identity.into();
        if identity.trim().is_empty() {
            return Err(BunqError::configuration("凭证缺少身份标识"));
        }
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(BunqError::configuration(match auth_mode {
                AuthMode::ApiKey => "API Key 为空",
                AuthMode::OAuth => "OAuth 模式缺少 access token",
            }));
        }
        let private_key_pem = private_key_pem.into();
        let public_key_pem = public_key_pem.into();
        if private_key_pem.trim().is_empty() || public_key_pem.trim().is_empty() {
            return Err(BunqError::configuration("凭证缺少 RSA 密钥对"));
        }

        Ok(Self {
            identity,
            auth_mode,
            environment,
            secret,
            private_key_pem,
            public_key_pem,
        })
    }

    /// 由环境与密钥派生稳定的身份标识
    pub fn derive_identity(environment: Environment, secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(environment.as_str().as_bytes());
        hasher.update(b":");
        hasher.update(secret.as_bytes());
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }

    pub fn public_key_pem(&self) -> &str {
        &self.public_key_pem
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("auth_mode", &self.auth_mode)
            .field("environment", &self.environment)
            .field("secret", &"***")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!("Sandbox".parse::<Environment>().unwrap(), Environment::Sandbox);
        assert_eq!(
            " production ".parse::<Environment>().unwrap(),
            Environment::Production
        );
        let err = "staging".parse::<Environment>().unwrap_err();
        assert!(matches!(err, BunqError::Configuration(_)));
    }

    #[test]
    fn test_environment_base_url() {
        assert!(Environment::Sandbox.base_url().contains("sandbox"));
        assert_eq!(Environment::Production.base_url(), "https://api.bunq.com/v1");
    }

    #[test]
    fn test_credential_requires_identity_and_secret() {
        let err = Credential::new("", AuthMode::ApiKey, Environment::Sandbox, "k", "a", "b")
            .unwrap_err();
        assert!(matches!(err, BunqError::Configuration(_)));

        let err = Credential::new("id", AuthMode::OAuth, Environment::Sandbox, " ", "a", "b")
            .unwrap_err();
        assert!(err.to_string().contains("access token"));
    }

    #[test]
    fn test_derive_identity_is_stable() {
        let a = Credential::derive_identity(Environment::Sandbox, "sandbox_key");
        let b = Credential::derive_identity(Environment::Sandbox, "sandbox_key");
        let c = Credential::derive_identity(Environment::Production, "sandbox_key");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_debug_hides_secret() {
        let credential = Credential::new(
            "id",
            AuthMode::ApiKey,
            Environment::Sandbox,
            "super-secret-key",
            "priv",
            "pub",
        )
        .unwrap();
        let debug = format!("{credential:?}");
        assert!(!debug.contains("super-secret-key"));
        assert!(!debug.contains("priv"));
    }
}
