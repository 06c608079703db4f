//! 适配器共用的重试策略
//!
//! 仅对 Transport 错误（网络 / 5xx）重试：默认最多 3 次，间隔 1s → 2s → 4s。
//! Protocol 错误立即返回。每次尝试的超时由请求本身控制，重试只在两次尝试之间增加等待。

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;

use crate::llm::LlmError;

/// 重试策略（对应 [llm.retry] 配置段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay_ms: base_delay.as_millis() as u64,
        }
    }

    /// 指数退避：base → 2·base → 4·base …，无抖动
    pub fn backoff(&self) -> ExponentialBuilder {
        let base = Duration::from_millis(self.base_delay_ms);
        ExponentialBuilder::default()
            .with_min_delay(base)
            .with_max_delay(base.saturating_mul(1 << self.max_retries.min(16)))
            .with_factor(2.0)
            .with_max_times(self.max_retries)
    }
}

/// 按策略执行 op，Transport 错误重试，耗尽后返回最后一次的错误
pub async fn send_with_retry<T, F, Fut>(policy: &RetryPolicy, vendor: &str, op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    op.retry(policy.backoff())
        .when(LlmError::is_retryable)
        .notify(|err: &LlmError, delay: Duration| {
            tracing::warn!(
                vendor,
                delay_ms = delay.as_millis() as u64,
                "LLM request failed ({}), retrying",
                err
            );
        })
        .await
}
