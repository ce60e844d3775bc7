//! 付款：列表与创建

use bunqflow_core::{BunqError, BunqResult};
use bunqflow_providers::{ApiRequest, PageOptions};
use serde_json::Value;

use crate::context::ExecutionContext;
use crate::models::{decode_items, Payment, PaymentRequest};

pub async fn list_payments(
    ctx: &ExecutionContext,
    account_id: i64,
    options: &PageOptions,
) -> BunqResult<Vec<Payment>> {
    let path = ctx
        .user_path(&format!("/monetary-account/{account_id}/payment"))
        .await?;
    let items = ctx.list(&path, options).await?;
    decode_items(&path, items)
}

/// 创建付款，返回新付款 ID
pub async fn create_payment(
    ctx: &ExecutionContext,
    account_id: i64,
    request: &PaymentRequest,
) -> BunqResult<i64> {
    let path = ctx
        .user_path(&format!("/monetary-account/{account_id}/payment"))
        .await?;
    let body = serde_json::to_value(request).map_err(|e| BunqError::Decode {
        endpoint: path.clone(),
        message: format!("付款请求序列化失败: {e}"),
    })?;

    let response = ctx.call(ApiRequest::post(path.as_str(), body)).await?;
    let id = created_id(&response).ok_or_else(|| BunqError::Decode {
        endpoint: path.clone(),
        message: "响应缺少付款 ID".to_string(),
    })?;
    tracing::info!("[Payments] 已创建付款: account={}, id={}", account_id, id);
    Ok(id)
}

/// `{"Response":[{"Id":{"id":N}}]}`
pub(crate) fn created_id(response: &Value) -> Option<i64> {
    response
        .get("Response")?
        .as_array()?
        .iter()
        .find_map(|item| item.get("Id")?.get("id")?.as_i64())
}
