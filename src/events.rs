//! 对话过程事件：状态、用量、工具调用与最终消息
//!
//! 尽力投递：接收端关闭或未设置时静默丢弃，永远不会影响一轮对话的结果。

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::stats::StatsSnapshot;
use crate::llm::Usage;

/// agent.status 中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Start,
    Thinking,
    ToolCall,
    ToolDone,
    Fallback,
    Finish,
    ContextCleared,
}

/// 单个事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Status {
        session_id: String,
        state: AgentState,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        iteration: Option<usize>,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    /// 每次模型往返一条
    Usage {
        session_id: String,
        usage: Usage,
        /// 会话累计
        cumulative: StatsSnapshot,
    },
    ToolCalled {
        session_id: String,
        tool_call_id: String,
        name: String,
        args: Map<String, Value>,
    },
    ToolSucceeded {
        session_id: String,
        tool_call_id: String,
        name: String,
        args: Map<String, Value>,
        result: Value,
    },
    ToolFailed {
        session_id: String,
        tool_call_id: String,
        name: String,
        args: Map<String, Value>,
        error: Value,
    },
    /// 最终回复 + 会话统计
    Message {
        session_id: String,
        content: String,
        stats: StatsSnapshot,
    },
}

impl AgentEvent {
    pub fn status(session_id: &str, state: AgentState, message: impl Into<String>) -> Self {
        Self::Status {
            session_id: session_id.to_string(),
            state,
            message: message.into(),
            iteration: None,
            name: None,
        }
    }

    /// 事件名（点分形式，如 `tool.succeeded`）
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status { .. } => "agent.status",
            Self::Usage { .. } => "llm.usage",
            Self::ToolCalled { .. } => "tool.called",
            Self::ToolSucceeded { .. } => "tool.succeeded",
            Self::ToolFailed { .. } => "tool.failed",
            Self::Message { .. } => "agent.message",
        }
    }
}

/// 发送事件，失败静默忽略
pub fn send_event(tx: Option<&UnboundedSender<AgentEvent>>, ev: AgentEvent) {
    if let Some(t) = tx {
        if t.send(ev).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}
