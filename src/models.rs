//! 节点层数据结构

use bunqflow_core::{BunqError, BunqResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 金额，bunq 以字符串表示数值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Amount {
    pub value: String,
    pub currency: String,
}

impl Amount {
    pub fn eur(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            currency: "EUR".to_string(),
        }
    }
}

/// 收款方别名
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pointer {
    /// IBAN / EMAIL / PHONE_NUMBER
    #[serde(rename = "type")]
    pub pointer_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Pointer {
    pub fn iban(value: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pointer_type: "IBAN".to_string(),
            value: value.into(),
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonetaryAccount {
    pub id: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub balance: Option<Amount>,
    #[serde(default)]
    pub created: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Payment {
    pub id: i64,
    #[serde(default)]
    pub created: Option<String>,
    pub amount: Amount,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub counterparty_alias: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub amount: Amount,
    pub counterparty_alias: Pointer,
    pub description: String,
}

/// 回调过滤器（notification-filter-url）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_target: Option<String>,
}

impl NotificationFilter {
    pub fn url(category: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            notification_target: Some(target.into()),
        }
    }
}

/// 将解包后的列表条目转为具体类型
pub(crate) fn decode_items<T: DeserializeOwned>(
    endpoint: &str,
    items: Vec<Value>,
) -> BunqResult<Vec<T>> {
    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| BunqError::Decode {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
        })
        .collect()
}
