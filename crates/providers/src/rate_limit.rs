//! 出站请求限流
//!
//! 按 (凭证身份, 端点类别) 维护独立窗口，超出配额时让调用方等待而不是报错：
//!
//! | 类别 | 配额 |
//! |---|---|
//! | GET | 3 次 / 3 秒 |
//! | POST | 5 次 / 3 秒 |
//! | PUT | 2 次 / 3 秒 |
//! | 创建会话（`/session-server`） | 1 次 / 30 秒，同时计入 POST |
//!
//! 同一窗口的“检查-等待-计数”在窗口互斥锁内完成，并发调用按到达顺序放行，
//! 不会同时看到空位而突破配额。不同窗口之间互不阻塞。

use bunqflow_core::{BunqError, BunqResult, HttpMethod};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const SESSION_SERVER_PATH: &str = "/session-server";

/// 限流类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    Get,
    Post,
    Put,
    SessionCreation,
}

/// 窗口配额
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub max_requests: usize,
    pub window: Duration,
}

impl EndpointClass {
    pub fn quota(self) -> Quota {
        match self {
            EndpointClass::Get => Quota {
                max_requests: 3,
                window: Duration::from_millis(3_000),
            },
            EndpointClass::Post => Quota {
                max_requests: 5,
                window: Duration::from_millis(3_000),
            },
            EndpointClass::Put => Quota {
                max_requests: 2,
                window: Duration::from_millis(3_000),
            },
            EndpointClass::SessionCreation => Quota {
                max_requests: 1,
                window: Duration::from_millis(30_000),
            },
        }
    }

    /// 请求需要占用的窗口，按获取顺序排列
    ///
    /// 创建会话先占专用窗口再占 POST 窗口；DELETE 等其他方法不限流。
    pub fn classify(method: HttpMethod, path: &str) -> Vec<EndpointClass> {
        let normalized = normalize_path(path);
        match method {
            HttpMethod::Post if normalized == SESSION_SERVER_PATH => {
                vec![EndpointClass::SessionCreation, EndpointClass::Post]
            }
            HttpMethod::Get => vec![EndpointClass::Get],
            HttpMethod::Post => vec![EndpointClass::Post],
            HttpMethod::Put => vec![EndpointClass::Put],
            _ => Vec::new(),
        }
    }
}

/// 归一化请求路径
///
/// 可接受完整 URL 或相对路径；去掉 query/fragment、末尾的 `/` 和 `/v1` 前缀。
pub fn normalize_path(raw: &str) -> String {
    let path = match url::Url::parse(raw) {
        Ok(url) => url.path().to_string(),
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string(),
    };

    let mut path = path.trim_end_matches('/').to_ascii_lowercase();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    match path.strip_prefix("/v1") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            if rest.is_empty() {
                "/".to_string()
            } else {
                rest.to_string()
            }
        }
        _ => path,
    }
}

/// 单个窗口：记录最近一个窗口时长内的放行时间
#[derive(Debug, Default)]
struct RateLimitWindow {
    admitted: VecDeque<Instant>,
}

impl RateLimitWindow {
    fn evict_expired(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.admitted.front() {
            if now.duration_since(oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// 等到窗口内有空位（不占用名额）
    async fn wait_for_room(&mut self, credential_id: &str, class: EndpointClass) {
        let quota = class.quota();
        debug_assert!(quota.max_requests > 0);
        loop {
            let now = Instant::now();
            self.evict_expired(now, quota.window);
            if self.admitted.len() < quota.max_requests {
                return;
            }
            let Some(&oldest) = self.admitted.front() else {
                return;
            };
            let wait = quota.window.saturating_sub(now.duration_since(oldest));
            tracing::debug!(
                "[RateLimiter] 配额已满，等待 {}ms: credential={}, class={:?}",
                wait.as_millis(),
                credential_id,
                class
            );
            tokio::time::sleep(wait).await;
        }
    }
}

/// 窗口状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub window_start: Option<Instant>,
    pub count: usize,
}

type WindowKey = (String, EndpointClass);

/// 进程级限流器
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<WindowKey, Arc<Mutex<RateLimitWindow>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待直到有可用配额，然后占用一个名额
    ///
    /// 只有凭证身份缺失时报错。
    pub async fn acquire(
        &self,
        credential_id: &str,
        method: HttpMethod,
        path: &str,
    ) -> BunqResult<()> {
        if credential_id.trim().is_empty() {
            return Err(BunqError::configuration("限流需要凭证身份，不能匿名调用"));
        }

        let classes = EndpointClass::classify(method, path);
        let Some((&outer, inner)) = classes.split_first() else {
            return Ok(());
        };

        // 外层窗口（创建会话）的锁持有到内层窗口放行之后，
        // 放行时间记为实际发出请求的时刻
        let window = self.window(credential_id, outer);
        let mut state = window.lock().await;
        state.wait_for_room(credential_id, outer).await;
        for &class in inner {
            self.acquire_slot(credential_id, class).await;
        }
        state.admitted.push_back(Instant::now());
        Ok(())
    }

    fn window(&self, credential_id: &str, class: EndpointClass) -> Arc<Mutex<RateLimitWindow>> {
        self.windows
            .entry((credential_id.to_string(), class))
            .or_default()
            .clone()
    }

    async fn acquire_slot(&self, credential_id: &str, class: EndpointClass) {
        let window = self.window(credential_id, class);
        let mut state = window.lock().await;
        state.wait_for_room(credential_id, class).await;
        state.admitted.push_back(Instant::now());
    }

    /// 当前窗口快照（不存在时为空窗口）
    pub async fn snapshot(&self, credential_id: &str, class: EndpointClass) -> WindowSnapshot {
        let Some(window) = self
            .windows
            .get(&(credential_id.to_string(), class))
            .map(|entry| entry.value().clone())
        else {
            return WindowSnapshot {
                window_start: None,
                count: 0,
            };
        };

        let mut state = window.lock().await;
        state.evict_expired(Instant::now(), class.quota().window);
        WindowSnapshot {
            window_start: state.admitted.front().copied(),
            count: state.admitted.len(),
        }
    }
}
