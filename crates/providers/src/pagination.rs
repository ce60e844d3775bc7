//! 列表分页
//!
//! bunq 列表接口按时间倒序返回，`Pagination.older_url` 指向更早的一页。
//! 遍历在以下任一条件下结束：没有 `older_url`、达到条数上限、
//! 遇到早于截止时间的条目、或者游标重复。

use bunqflow_core::{BunqError, BunqResult, Credential};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

use crate::client::{ApiRequest, BunqHttpClient};

/// bunq 时间戳格式（UTC）
pub const CREATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// 单页最大条数
pub const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone)]
pub struct PageOptions {
    /// 最多返回的条数，None 表示全部
    pub limit: Option<usize>,
    /// 只返回此时间之后创建的条目
    pub created_after: Option<DateTime<Utc>>,
    pub page_size: usize,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            limit: None,
            created_after: None,
            page_size: MAX_PAGE_SIZE,
        }
    }
}

impl PageOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn created_after(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_after = Some(cutoff);
        self
    }

    fn effective_page_size(&self) -> usize {
        let size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        match self.limit {
            Some(limit) if limit > 0 => size.min(limit),
            _ => size,
        }
    }
}

/// 解析 bunq 的 `created` 字段
pub fn parse_created(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, CREATED_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// 取出 `{"Payment": {...}}` 这类单键包装中的对象
pub fn unwrap_tagged(entry: &Value) -> Value {
    match entry.as_object() {
        Some(object) if object.len() == 1 => object
            .values()
            .next()
            .cloned()
            .unwrap_or(Value::Null),
        _ => entry.clone(),
    }
}

/// 按时间倒序遍历列表接口，返回解包后的条目
pub async fn paginate(
    client: &BunqHttpClient,
    credential: &Credential,
    session_token: &str,
    first_path: &str,
    options: &PageOptions,
) -> BunqResult<Vec<Value>> {
    let mut items = Vec::new();
    if options.limit == Some(0) {
        return Ok(items);
    }

    let mut visited = HashSet::new();
    let mut next = Some(with_count(first_path, options.effective_page_size()));

    'walk: while let Some(path) = next.take() {
        if !visited.insert(cursor_key(&path)) {
            tracing::warn!("[Pagination] 游标重复，停止遍历: {}", path);
            break;
        }

        let page = client
            .request(credential, ApiRequest::get(path.as_str()).with_token(session_token))
            .await?;
        let entries = page
            .get("Response")
            .and_then(Value::as_array)
            .ok_or_else(|| BunqError::Decode {
                endpoint: path.clone(),
                message: "列表响应缺少 Response 数组".to_string(),
            })?;

        for entry in entries {
            let item = unwrap_tagged(entry);
            if let (Some(cutoff), Some(created)) = (
                options.created_after,
                item.get("created").and_then(Value::as_str).and_then(parse_created),
            ) {
                if created < cutoff {
                    break 'walk;
                }
            }
            items.push(item);
            if options.limit.is_some_and(|limit| items.len() >= limit) {
                break 'walk;
            }
        }

        next = page
            .pointer("/Pagination/older_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string);
    }

    tracing::debug!("[Pagination] {} 共取得 {} 条", first_path, items.len());
    Ok(items)
}

fn with_count(path: &str, count: usize) -> String {
    if path.contains("count=") {
        return path.to_string();
    }
    let separator = if path.contains('?') { '&' } else { '?' };
    format!("{path}{separator}count={count}")
}

/// 游标去重键：完整 URL、`/v1/x` 与 `/x` 视为同一游标
fn cursor_key(path: &str) -> String {
    let relative = match url::Url::parse(path) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => path.to_string(),
    };
    match relative.strip_prefix("/v1") {
        Some(rest) if rest.starts_with(['/', '?']) => rest.to_string(),
        _ => relative,
    }
}
