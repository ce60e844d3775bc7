//! 批量执行
//!
//! 节点对每个输入条目调用一次操作。`continue_on_fail` 时失败被记录并继续，
//! 否则第一个错误终止整批。

use bunqflow_core::{BunqError, BunqResult};
use std::future::Future;

#[derive(Debug)]
pub enum ItemOutcome<T> {
    Succeeded { index: usize, output: T },
    Failed { index: usize, error: BunqError },
}

impl<T> ItemOutcome<T> {
    pub fn index(&self) -> usize {
        match self {
            ItemOutcome::Succeeded { index, .. } | ItemOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded { .. })
    }
}

/// 按顺序执行
pub async fn run_items<I, T, F, Fut>(
    items: Vec<I>,
    continue_on_fail: bool,
    mut op: F,
) -> BunqResult<Vec<ItemOutcome<T>>>
where
    F: FnMut(usize, I) -> Fut,
    Fut: Future<Output = BunqResult<T>>,
{
    let mut outcomes = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match op(index, item).await {
            Ok(output) => outcomes.push(ItemOutcome::Succeeded { index, output }),
            Err(error) if continue_on_fail => {
                tracing::warn!("[Batch] 第 {} 项失败，继续执行: {}", index, error);
                outcomes.push(ItemOutcome::Failed { index, error });
            }
            Err(error) => {
                tracing::error!("[Batch] 第 {} 项失败，终止: {}", index, error);
                return Err(error);
            }
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn double_or_fail(_: usize, n: i32) -> BunqResult<i32> {
        if n < 0 {
            Err(BunqError::configuration("negative"))
        } else {
            Ok(n * 2)
        }
    }

    #[tokio::test]
    async fn test_continue_on_fail_records_failures() {
        let outcomes = run_items(vec![1, -1, 3], true, double_or_fail).await.unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].is_success());
        assert!(matches!(
            &outcomes[1],
            ItemOutcome::Failed { index: 1, error: BunqError::Configuration(_) }
        ));
        assert!(matches!(outcomes[2], ItemOutcome::Succeeded { index: 2, output: 6 }));
    }

    #[tokio::test]
    async fn test_abort_stops_at_first_error() {
        let mut seen = Vec::new();
        let err = run_items(vec![1, -1, 3], false, |index, n| {
            seen.push(index);
            double_or_fail(index, n)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, BunqError::Configuration(_)));
        assert_eq!(seen, vec![0, 1]);
    }
}
