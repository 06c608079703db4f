//! 会话缓存：余额（带 TTL）与代币元数据
//!
//! 归 Orchestrator 所有；交易类工具成功后余额缓存失效，clear_context 时整体重置。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct SessionCache {
    ttl: Duration,
    balance: Option<(Value, Instant)>,
    token_metadata: HashMap<String, Value>,
}

impl SessionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            balance: None,
            token_metadata: HashMap::new(),
        }
    }

    pub fn cache_balance(&mut self, data: Value) {
        self.balance = Some((data, Instant::now()));
    }

    /// 未过期时返回缓存的余额
    pub fn cached_balance(&self) -> Option<&Value> {
        match &self.balance {
            Some((data, at)) if at.elapsed() < self.ttl => Some(data),
            _ => None,
        }
    }

    pub fn invalidate_balance(&mut self) {
        self.balance = None;
    }

    pub fn cache_token_metadata(&mut self, mint: impl Into<String>, metadata: Value) {
        self.token_metadata.insert(mint.into(), metadata);
    }

    pub fn token_metadata(&self, mint: &str) -> Option<&Value> {
        self.token_metadata.get(mint)
    }

    pub fn reset(&mut self) {
        self.balance = None;
        self.token_metadata.clear();
    }
}
