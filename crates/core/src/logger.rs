//! 日志模块
//!
//! - `init_tracing`: 安装 tracing-subscriber（RUST_LOG 优先于配置级别）
//! - `sanitize_log_message`: 写日志前脱敏密钥、token 与 PEM 内容

use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化全局日志，重复调用不会报错
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

static SANITIZE_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let patterns = [
        (
            r"-----BEGIN [A-Z ]*KEY-----[\s\S]*?-----END [A-Z ]*KEY-----",
            "<pem redacted>",
        ),
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        (
            r#"(?i)x-bunq-client-authentication["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "x-bunq-client-authentication: ***",
        ),
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"(?i)"?token"?\s*[:=]\s*"?[A-Za-z0-9._-]{8,}"?"#,
            "token: ***",
        ),
        (
            r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "secret: ***",
        ),
    ];
    patterns
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
});

pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_RULES.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_message;

    #[test]
    fn test_sanitize_bearer_token() {
        let input = "Authorization: Bearer abcDEF123._-XYZ";
        let output = sanitize_log_message(input);
        assert!(!output.contains("abcDEF123"));
        assert!(output.contains("***"));
    }

    #[test]
    fn test_sanitize_bunq_auth_header() {
        let input = "X-Bunq-Client-Authentication: 9a8b7c6d5e4f3a2b1c";
        let output = sanitize_log_message(input);
        assert!(!output.contains("9a8b7c6d5e4f3a2b1c"));
    }

    #[test]
    fn test_sanitize_session_token_json() {
        let input = r#"{"Token":{"id":1,"token":"f3d1a2b3c4d5e6f7a8b9"}}"#;
        let output = sanitize_log_message(input);
        assert!(!output.contains("f3d1a2b3c4d5e6f7a8b9"));
    }

    #[test]
    fn test_sanitize_secret_body() {
        let input = r#"{"description":"bunqflow","secret":"sandbox_0123abc"}"#;
        let output = sanitize_log_message(input);
        assert!(output.contains("secret: ***"));
        assert!(!output.contains("sandbox_0123abc"));
    }

    #[test]
    fn test_sanitize_pem() {
        let input = "key=-----BEGIN PUBLIC KEY-----\nMIIBIjANBgkq\n-----END PUBLIC KEY----- end";
        let output = sanitize_log_message(input);
        assert!(!output.contains("MIIBIjANBgkq"));
        assert!(output.contains("<pem redacted>"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let input = "GET /user/42/monetary-account 200";
        assert_eq!(sanitize_log_message(input), input);
    }
}
