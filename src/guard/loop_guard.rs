//! 单轮内的工具调用守卫
//!
//! - 重复调用抑制：最近 N 次（默认 5）调用的 CallSignature 命中即不再执行
//! - 单次成功规则：指定工具（默认 get_balance）成功一次后，本轮不再执行
//! - 每工具调用次数上限（可选）
//! - 连续失败计数：达到上限后追加一次分类提示，本轮剩余时间不再做自动纠正

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// 去重键：工具名 + 规范化（键排序）后的参数字符串
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CallSignature {
    pub tool_name: String,
    pub canonical_args: String,
}

impl CallSignature {
    pub fn new(tool_name: &str, args: &Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            canonical_args: canonical_json(&Value::Object(args.clone())),
        }
    }
}

/// 键按字典序输出的 JSON 文本（与 serde_json 是否启用 preserve_order 无关）
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let body: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// 守卫配置（对应 [guard] 配置段）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// 去重窗口大小
    pub history_window: usize,
    /// 连续失败上限
    pub error_streak_limit: usize,
    /// 成功一次后本轮禁止再次调用的工具
    pub single_shot_tools: Vec<String>,
    /// 每工具每轮最大调用次数
    pub call_limits: HashMap<String, usize>,
    /// 未在 call_limits 中列出的工具的上限；None 表示不限
    pub default_call_limit: Option<usize>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            history_window: 5,
            error_streak_limit: 3,
            single_shot_tools: vec!["get_balance".to_string()],
            call_limits: HashMap::new(),
            default_call_limit: None,
        }
    }
}

/// 调用前的判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    /// 允许执行（已记入历史）
    Allow,
    /// 与窗口内某次调用完全相同
    Duplicate,
    /// 单次成功规则命中
    AlreadySucceeded,
    /// 超过每工具调用上限
    LimitExceeded { count: usize, limit: usize },
}

impl GuardVerdict {
    /// 代替真实结果写入 tool 消息的通知；Allow 时为 None
    pub fn notice(&self, tool_name: &str) -> Option<Value> {
        match self {
            Self::Allow => None,
            Self::Duplicate => Some(json!({
                "error": "DUPLICATE_TOOL_CALL",
                "message": format!("Tool '{tool_name}' was already called with identical arguments in this turn."),
                "instructions": "Use the previous result instead of calling this tool again.",
            })),
            Self::AlreadySucceeded => Some(json!({
                "error": "TOOL_ALREADY_SUCCEEDED",
                "message": format!("Tool '{tool_name}' already returned a successful result in this turn."),
                "instructions": "Use the result you already have. Do not call this tool again.",
            })),
            Self::LimitExceeded { count, limit } => Some(json!({
                "error": "TOOL_CALL_LIMIT_EXCEEDED",
                "message": format!("Tool '{tool_name}' was called {count} times (limit: {limit}). Use previous results."),
                "instructions": "Provide a final answer based on information you already have. Do not call this tool again.",
            })),
        }
    }

    /// 需要额外追加的 system 纠正（仅单次成功规则）
    pub fn corrective_message(&self, tool_name: &str) -> Option<String> {
        match self {
            Self::AlreadySucceeded => Some(format!(
                "STOP: '{tool_name}' already succeeded in this turn and its result is in the conversation. \
                 Do NOT call '{tool_name}' again. Use the existing result to continue or give your final answer."
            )),
            _ => None,
        }
    }
}

/// 一次失败记录后的处理建议
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// 当前连续失败次数
    pub streak: usize,
    /// 是否仍对本次失败做自动纠正（替代调用、单次失败提示）
    pub remediate: bool,
    /// 本次失败是否刚好触发连续失败上限（需追加一次分类提示）
    pub cutoff_reached: bool,
}

/// 单轮守卫状态；每轮新建，结束即丢弃
#[derive(Debug, Clone)]
pub struct LoopGuard {
    config: GuardConfig,
    history: VecDeque<CallSignature>,
    call_counts: HashMap<String, usize>,
    succeeded: HashSet<String>,
    error_streak: usize,
    remediation_exhausted: bool,
}

impl LoopGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            history: VecDeque::new(),
            call_counts: HashMap::new(),
            succeeded: HashSet::new(),
            error_streak: 0,
            remediation_exhausted: false,
        }
    }

    /// 调用前判定；Allow 时把签名记入窗口并计数，其余情况状态不变
    pub fn admit(&mut self, signature: &CallSignature) -> GuardVerdict {
        if self.history.contains(signature) {
            return GuardVerdict::Duplicate;
        }
        let name = &signature.tool_name;
        if self.succeeded.contains(name) && self.config.single_shot_tools.iter().any(|t| t == name) {
            return GuardVerdict::AlreadySucceeded;
        }
        // 只有放行的调用计入次数
        let attempt = self.call_counts.get(name).copied().unwrap_or(0) + 1;
        let limit = self
            .config
            .call_limits
            .get(name)
            .copied()
            .or(self.config.default_call_limit);
        if let Some(limit) = limit {
            if attempt > limit {
                return GuardVerdict::LimitExceeded { count: attempt, limit };
            }
        }

        self.call_counts.insert(name.clone(), attempt);
        self.history.push_back(signature.clone());
        while self.history.len() > self.config.history_window.max(1) {
            self.history.pop_front();
        }
        GuardVerdict::Allow
    }

    pub fn record_success(&mut self, tool_name: &str) {
        self.error_streak = 0;
        self.succeeded.insert(tool_name.to_string());
    }

    pub fn record_failure(&mut self) -> FailureOutcome {
        self.error_streak += 1;
        if self.remediation_exhausted {
            return FailureOutcome {
                streak: self.error_streak,
                remediate: false,
                cutoff_reached: false,
            };
        }
        let cutoff_reached = self.error_streak >= self.config.error_streak_limit;
        if cutoff_reached {
            self.remediation_exhausted = true;
        }
        FailureOutcome {
            streak: self.error_streak,
            remediate: true,
            cutoff_reached,
        }
    }

    /// 是否仍允许自动纠正（替代调用等）
    pub fn remediation_active(&self) -> bool {
        !self.remediation_exhausted
    }

    pub fn error_streak(&self) -> usize {
        self.error_streak
    }
}
