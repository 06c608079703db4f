//! 厂商适配器抽象
//!
//! 所有厂商实现 ProviderAdapter：把规范格式的对话与工具目录转成厂商请求，发送并把响应解析回 ModelReply。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::{Message, ToolCallRequest};
use crate::tools::ToolSpec;

/// 单次往返的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// 模型一次回复：文本 + 有序工具调用 + 用量
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub usage: Usage,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// 适配器错误：Transport 可重试（网络 / 5xx），Protocol 不可重试（4xx / 响应格式错误）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("{vendor} transport error: {message}")]
    Transport { vendor: String, message: String },

    #[error("{vendor} protocol error{}: {message}", fmt_status(.status))]
    Protocol {
        vendor: String,
        status: Option<u16>,
        message: String,
    },
}

impl LlmError {
    pub fn transport(vendor: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }

    pub fn protocol(vendor: &str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Protocol {
            vendor: vendor.to_string(),
            status,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// 厂商适配器
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// 厂商名（日志与错误信息用）
    fn name(&self) -> &str;

    /// 发送一次完整对话；重试在适配器内部完成
    async fn send(&self, conversation: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError>;
}
