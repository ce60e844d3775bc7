//! 账户列表

use bunqflow_core::BunqResult;
use bunqflow_providers::PageOptions;

use crate::context::ExecutionContext;
use crate::models::{decode_items, MonetaryAccount};

pub async fn list_monetary_accounts(
    ctx: &ExecutionContext,
    options: &PageOptions,
) -> BunqResult<Vec<MonetaryAccount>> {
    let path = ctx.user_path("/monetary-account").await?;
    let items = ctx.list(&path, options).await?;
    tracing::info!("[Accounts] 获取账户 {} 个", items.len());
    decode_items(&path, items)
}
