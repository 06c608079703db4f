//! 工具失败分类与纠正提示
//!
//! 分类器是可替换的（ErrorClassifier trait）；默认 KeywordClassifier 按优先级顺序匹配关键字：
//! insufficient_balance > validation > network > general。每个类别对应两段提示模板：
//! 单次失败的提示与连续失败达到上限时的提示。

use serde::Serialize;

use crate::tools::ToolCallResult;

/// 工具失败类别
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InsufficientBalance,
    Validation,
    Network,
    /// 工具不存在（由 ToolInvoker 直接给出，不参与关键字匹配）
    NotFound,
    General,
}

impl ErrorCategory {
    /// 解析工具自带的类别字符串；无法识别时返回 None，交给分类器处理
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insufficient_balance" | "balance" | "wallet" => Some(Self::InsufficientBalance),
            "validation" => Some(Self::Validation),
            "network" => Some(Self::Network),
            "not_found" => Some(Self::NotFound),
            "general" => Some(Self::General),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientBalance => "insufficient_balance",
            Self::Validation => "validation",
            Self::Network => "network",
            Self::NotFound => "not_found",
            Self::General => "general",
        }
    }

    /// 单次失败后追加的 system 提示
    pub fn failure_guidance(&self, message: &str, missing_fields: &[String]) -> String {
        match self {
            Self::Validation => {
                let missing = if missing_fields.is_empty() {
                    String::new()
                } else {
                    format!(" Missing fields: {}.", missing_fields.join(", "))
                };
                format!(
                    "TOOL VALIDATION ERROR: {message}{missing} You must gather the required parameters \
                     from the user or summarize the plan before retrying. Do not claim the action \
                     succeeded until the tool returns a success response."
                )
            }
            Self::InsufficientBalance => "TOOL BALANCE ERROR: The operation failed due to insufficient \
                 funds. Explain the issue, include the required amount if known, and suggest next steps \
                 instead of retrying immediately."
                .to_string(),
            Self::Network => "TOOL NETWORK ERROR: There was a connectivity problem. Inform the user and \
                 suggest trying again later rather than claiming success."
                .to_string(),
            Self::NotFound => format!(
                "TOOL NOT FOUND: {message} Only call tools from the provided tool list."
            ),
            Self::General => format!(
                "TOOL ERROR: {message} Do not state that the action completed. Provide the error details \
                 to the user and propose what to do next."
            ),
        }
    }

    /// 连续失败达到上限时追加的 system 提示（之后本轮不再追加任何纠正）
    pub fn streak_guidance(&self, message: &str) -> String {
        match self {
            Self::InsufficientBalance => format!(
                "BALANCE ERROR: The user doesn't have enough SOL for transactions. Current error: {message}. \
                 INSTRUCTIONS: 1) Explain the balance issue clearly, 2) Tell them exactly how much they need \
                 vs what they have, 3) Suggest checking balance or adding funds, 4) DO NOT attempt any more \
                 transactions or balance checks."
            ),
            Self::Validation => format!(
                "VALIDATION ERROR: Invalid input parameters. Error: {message}. INSTRUCTIONS: 1) Explain what \
                 input was invalid, 2) Provide correct format examples, 3) DO NOT retry the same operation \
                 with invalid parameters."
            ),
            Self::Network => format!(
                "NETWORK ERROR: Connection or service issue. Error: {message}. INSTRUCTIONS: 1) Explain the \
                 network/service issue, 2) Suggest trying again later, 3) DO NOT immediately retry the same \
                 operation."
            ),
            Self::NotFound | Self::General => format!(
                "MULTIPLE ERRORS: Several tool operations failed. Last error: {message}. INSTRUCTIONS: \
                 1) Explain what went wrong, 2) Provide alternative suggestions, 3) DO NOT make any more \
                 tool calls."
            ),
        }
    }
}

/// 失败分类器：输入错误描述，输出类别
pub trait ErrorClassifier: Send + Sync {
    fn classify(&self, message: &str) -> ErrorCategory;
}

/// 关键字规则：`all_of` 全部出现且 `any_of` 至少出现一个（为空则忽略）时命中
#[derive(Clone, Debug)]
pub struct KeywordRule {
    pub category: ErrorCategory,
    pub all_of: Vec<String>,
    pub any_of: Vec<String>,
}

impl KeywordRule {
    pub fn new(category: ErrorCategory, all_of: &[&str], any_of: &[&str]) -> Self {
        Self {
            category,
            all_of: all_of.iter().map(|s| s.to_string()).collect(),
            any_of: any_of.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches(&self, lowered: &str) -> bool {
        self.all_of.iter().all(|k| lowered.contains(k.as_str()))
            && (self.any_of.is_empty() || self.any_of.iter().any(|k| lowered.contains(k.as_str())))
    }
}

/// 按规则顺序匹配的关键字分类器，全部未命中时为 General
#[derive(Clone, Debug)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    pub fn new(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }

    /// 追加一条规则（优先级低于已有规则）
    pub fn with_rule(mut self, rule: KeywordRule) -> Self {
        self.rules.push(rule);
        self
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(vec![
            KeywordRule::new(ErrorCategory::InsufficientBalance, &["insufficient"], &["balance", "funds"]),
            KeywordRule::new(ErrorCategory::Validation, &[], &["validation", "invalid"]),
            KeywordRule::new(ErrorCategory::Network, &[], &["network", "connection", "timeout"]),
        ])
    }
}

impl ErrorClassifier for KeywordClassifier {
    fn classify(&self, message: &str) -> ErrorCategory {
        let lowered = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.category)
            .unwrap_or(ErrorCategory::General)
    }
}

/// 失败结果的最终类别：工具自带类别优先，否则交给分类器
pub fn categorize(classifier: &dyn ErrorClassifier, result: &ToolCallResult) -> ErrorCategory {
    result
        .error_category
        .unwrap_or_else(|| classifier.classify(&result.error_message()))
}
