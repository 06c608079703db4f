//! Agent 错误类型与用户可见的兜底文案
//!
//! 一轮对话对调用方永远返回字符串：AgentError 只在内部传递，最终由 `user_message` 转成固定文案。

use thiserror::Error;

use crate::llm::LlmError;

pub const BUDGET_EXHAUSTED_REPLY: &str =
    "I've reached the maximum number of processing steps. Please try rephrasing your request.";
pub const ADAPTER_FAILURE_REPLY: &str =
    "I'm sorry, I couldn't get a response from the language model. Please try again in a moment.";
pub const CANCELLED_REPLY: &str = "Request cancelled.";
pub const EMPTY_REPLY: &str = "No response generated";
pub const CONTEXT_CLEARED_REPLY: &str = "Context cleared! Starting fresh conversation.";

/// 一轮对话中可能出现的错误（适配器、预算、取消、持久化、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 适配器重试耗尽或协议错误
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Iteration budget exhausted after {0} iterations")]
    BudgetExhausted(usize),

    #[error("Turn cancelled")]
    Cancelled,

    /// 工具参数格式错误（记录日志后退化为空参数，不终止本轮）
    #[error("Argument parse error: {0}")]
    ArgumentParse(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// 转为返回给用户的文案（诊断细节只进日志与事件流）
    pub fn user_message(&self) -> String {
        match self {
            Self::Llm(_) => ADAPTER_FAILURE_REPLY.to_string(),
            Self::BudgetExhausted(_) => BUDGET_EXHAUSTED_REPLY.to_string(),
            Self::Cancelled => CANCELLED_REPLY.to_string(),
            other => format!("I encountered an error: {}", other),
        }
    }
}
