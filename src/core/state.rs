//! 单轮状态机的阶段与结果
//!
//! Start → Thinking → (ToolDispatch ⇄ Thinking)* → Finished | Aborted

use serde::Serialize;

use crate::llm::Usage;

/// 当前阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Start,
    Thinking,
    ToolDispatch,
    Finished,
    Aborted,
}

/// 一轮的终止方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// 模型给出最终回复（已持久化）
    Finished,
    BudgetExhausted,
    /// 适配器失败或其它不可恢复错误
    Aborted,
    Cancelled,
}

impl TurnOutcome {
    pub fn phase(&self) -> TurnPhase {
        match self {
            Self::Finished => TurnPhase::Finished,
            _ => TurnPhase::Aborted,
        }
    }
}

/// 一轮的结果：回复文本、终止方式、迭代次数、本轮累计用量
#[derive(Clone, Debug, Serialize)]
pub struct TurnReport {
    pub reply: String,
    pub outcome: TurnOutcome,
    pub iterations: usize,
    pub usage: Usage,
}

impl TurnReport {
    pub fn is_finished(&self) -> bool {
        self.outcome == TurnOutcome::Finished
    }
}
