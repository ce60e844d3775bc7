//! 回调地址管理
//!
//! bunq 以整组覆盖的方式设置 notification-filter-url，删除某个地址即提交剩余的过滤器。

use bunqflow_core::{BunqError, BunqResult};
use bunqflow_providers::{ApiRequest, PageOptions};
use serde_json::json;

use crate::context::ExecutionContext;
use crate::models::{decode_items, NotificationFilter};

const FILTER_PATH: &str = "/notification-filter-url";

pub async fn list_notification_filters(
    ctx: &ExecutionContext,
) -> BunqResult<Vec<NotificationFilter>> {
    let path = ctx.user_path(FILTER_PATH).await?;
    let items = ctx.list(&path, &PageOptions::default()).await?;
    decode_items(&path, items)
}

pub async fn set_notification_filters(
    ctx: &ExecutionContext,
    filters: &[NotificationFilter],
) -> BunqResult<()> {
    let path = ctx.user_path(FILTER_PATH).await?;
    ctx.call(ApiRequest::post(
        path.as_str(),
        json!({ "notification_filters": filters }),
    ))
    .await?;
    tracing::info!("[Callbacks] 已设置回调过滤器 {} 个", filters.len());
    Ok(())
}

/// 删除指向 `url` 的所有过滤器
///
/// 地址不存在或服务端返回 404 时视为已删除，返回 false。
pub async fn remove_callback_url(ctx: &ExecutionContext, url: &str) -> BunqResult<bool> {
    let filters = list_notification_filters(ctx).await?;
    let remaining: Vec<NotificationFilter> = filters
        .iter()
        .filter(|f| f.notification_target.as_deref() != Some(url))
        .cloned()
        .collect();

    if remaining.len() == filters.len() {
        tracing::debug!("[Callbacks] 回调地址不存在，无需删除: {}", url);
        return Ok(false);
    }

    match set_notification_filters(ctx, &remaining).await {
        Ok(()) => Ok(true),
        Err(BunqError::ApiCallFailed(failure)) if failure.status_code == 404 => {
            tracing::warn!("[Callbacks] 删除回调时资源已不存在: {}", failure);
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
