//! 握手响应解码
//!
//! bunq 响应统一为 `{"Response": [{"<Tag>": {...}}, ...]}`，每个元素只有一个标签键。
//! 这里把元素解码为 `ResponseItem`，并为三个握手步骤提取所需字段；
//! 缺少预期标签时返回 `MalformedHandshakeResponse`。

use bunqflow_core::{BunqError, BunqResult, HandshakeStep};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct IdPayload {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    #[serde(default)]
    pub id: Option<i64>,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerPublicKeyPayload {
    pub server_public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: i64,
    #[serde(default)]
    pub session_timeout: Option<u64>,
    /// 仅 UserApiKey 携带，内层同样是带标签的用户对象
    #[serde(default)]
    pub requested_by_user: Option<Value>,
}

impl UserPayload {
    /// 会话超时：优先自身字段，其次 requested_by_user 内层用户
    pub fn effective_session_timeout(&self) -> Option<u64> {
        self.session_timeout.or_else(|| {
            self.requested_by_user
                .as_ref()?
                .as_object()?
                .values()
                .find_map(|inner| inner.get("session_timeout").and_then(Value::as_u64))
        })
    }
}

/// 响应元素
#[derive(Debug, Clone)]
pub enum ResponseItem {
    Id(IdPayload),
    Token(TokenPayload),
    ServerPublicKey(ServerPublicKeyPayload),
    UserPerson(UserPayload),
    UserCompany(UserPayload),
    UserApiKey(UserPayload),
    /// 未识别或内容不合法的标签
    Other(String),
}

impl ResponseItem {
    fn decode(element: &Value) -> ResponseItem {
        let Some((tag, payload)) = element.as_object().and_then(|o| o.iter().next()) else {
            return ResponseItem::Other(String::new());
        };

        fn parse<T: serde::de::DeserializeOwned>(payload: &Value) -> Option<T> {
            serde_json::from_value(payload.clone()).ok()
        }

        let decoded = match tag.as_str() {
            "Id" => parse(payload).map(ResponseItem::Id),
            "Token" => parse(payload).map(ResponseItem::Token),
            "ServerPublicKey" => parse(payload).map(ResponseItem::ServerPublicKey),
            "UserPerson" => parse(payload).map(ResponseItem::UserPerson),
            "UserCompany" => parse(payload).map(ResponseItem::UserCompany),
            "UserApiKey" => parse(payload).map(ResponseItem::UserApiKey),
            _ => None,
        };
        decoded.unwrap_or_else(|| ResponseItem::Other(tag.clone()))
    }

    fn tag(&self) -> &str {
        match self {
            ResponseItem::Id(_) => "Id",
            ResponseItem::Token(_) => "Token",
            ResponseItem::ServerPublicKey(_) => "ServerPublicKey",
            ResponseItem::UserPerson(_) => "UserPerson",
            ResponseItem::UserCompany(_) => "UserCompany",
            ResponseItem::UserApiKey(_) => "UserApiKey",
            ResponseItem::Other(tag) => tag,
        }
    }
}

/// 解码 `Response` 数组
pub fn decode_response(step: HandshakeStep, body: &Value) -> BunqResult<Vec<ResponseItem>> {
    let items = body
        .get("Response")
        .and_then(Value::as_array)
        .ok_or_else(|| BunqError::malformed(step, "响应缺少 Response 数组"))?;
    Ok(items.iter().map(ResponseItem::decode).collect())
}

fn missing(step: HandshakeStep, expected: &str, items: &[ResponseItem]) -> BunqError {
    let found: Vec<&str> = items.iter().map(ResponseItem::tag).collect();
    BunqError::malformed(step, format!("缺少 {expected}，实际标签: {found:?}"))
}

#[derive(Debug, Clone)]
pub struct Installation {
    pub token: String,
    pub server_public_key: String,
}

#[derive(Debug, Clone)]
pub struct SessionServer {
    pub token: String,
    pub user_id: i64,
    pub session_timeout_secs: Option<u64>,
}

pub fn parse_installation(body: &Value) -> BunqResult<Installation> {
    let step = HandshakeStep::Installation;
    let items = decode_response(step, body)?;
    let token = items.iter().find_map(|item| match item {
        ResponseItem::Token(t) => Some(t.token.clone()),
        _ => None,
    });
    let server_public_key = items.iter().find_map(|item| match item {
        ResponseItem::ServerPublicKey(k) => Some(k.server_public_key.clone()),
        _ => None,
    });

    match (token, server_public_key) {
        (Some(token), Some(server_public_key)) => Ok(Installation {
            token,
            server_public_key,
        }),
        (None, _) => Err(missing(step, "Token", &items)),
        (_, None) => Err(missing(step, "ServerPublicKey", &items)),
    }
}

pub fn parse_device_registration(body: &Value) -> BunqResult<i64> {
    let step = HandshakeStep::DeviceRegistration;
    let items = decode_response(step, body)?;
    items
        .iter()
        .find_map(|item| match item {
            ResponseItem::Id(id) => Some(id.id),
            _ => None,
        })
        .ok_or_else(|| missing(step, "Id", &items))
}

pub fn parse_session_server(body: &Value) -> BunqResult<SessionServer> {
    let step = HandshakeStep::SessionCreation;
    let items = decode_response(step, body)?;
    let token = items
        .iter()
        .find_map(|item| match item {
            ResponseItem::Token(t) => Some(t.token.clone()),
            _ => None,
        })
        .ok_or_else(|| missing(step, "Token", &items))?;
    let user = items
        .iter()
        .find_map(|item| match item {
            ResponseItem::UserPerson(u) | ResponseItem::UserCompany(u) | ResponseItem::UserApiKey(u) => {
                Some(u)
            }
            _ => None,
        })
        .ok_or_else(|| missing(step, "UserPerson|UserCompany|UserApiKey", &items))?;

    Ok(SessionServer {
        token,
        user_id: user.id,
        session_timeout_secs: user.effective_session_timeout(),
    })
}
