//! 会话统计：累计 token、请求次数、上下文长度
//!
//! 原子计数，Orchestrator 通过 &self 更新；快照随 agent.message 事件发出。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::llm::Usage;

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    prompt_tokens: Arc<AtomicU64>,
    completion_tokens: Arc<AtomicU64>,
    total_tokens: Arc<AtomicU64>,
    requests: Arc<AtomicU64>,
    context_length: Arc<AtomicU64>,
}

/// 统计快照（可序列化）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub requests: u64,
    pub context_length: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次模型往返
    pub fn record_request(&self, usage: &Usage) {
        self.prompt_tokens.fetch_add(usage.prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(usage.completion_tokens, Ordering::Relaxed);
        self.total_tokens.fetch_add(usage.total_tokens, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_context_length(&self, len: usize) {
        self.context_length.store(len as u64, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [
            &self.prompt_tokens,
            &self.completion_tokens,
            &self.total_tokens,
            &self.requests,
            &self.context_length,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            completion_tokens: self.completion_tokens.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            context_length: self.context_length.load(Ordering::Relaxed),
        }
    }
}
