//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SAM__*` 覆盖（双下划线表示嵌套，如 `SAM__AGENT__MAX_ITERATIONS=8`）。
//! API Key 不进配置文件，从 OPENAI_API_KEY / ANTHROPIC_API_KEY / XAI_API_KEY 读取。

use std::path::PathBuf;

use serde::Deserialize;

use crate::guard::GuardConfig;
use crate::llm::{anthropic, openai, xai, RetryPolicy};

/// 内置系统提示（未配置 system_prompt / system_prompt_path 时使用）
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are SAM, an autonomous trading assistant. \
Use the available tools to answer questions about wallets, tokens and markets, and to execute trades \
when the user explicitly asks. Never call the same tool twice with the same arguments in one turn. \
If a tool fails, explain the failure briefly and suggest a next step instead of retrying blindly.";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub guard: GuardConfig,
    pub fallback: FallbackSection,
}

/// [app] 段：应用名、会话目录、系统提示
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// JSON 会话文件目录
    pub sessions_dir: PathBuf,
    /// 内联系统提示，优先于 system_prompt_path
    pub system_prompt: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            sessions_dir: PathBuf::from("./sessions"),
            system_prompt: None,
            system_prompt_path: None,
        }
    }
}

impl AppSection {
    /// 解析系统提示：内联 > 文件 > 内置默认；文件读取失败时记录警告并回退默认
    pub fn resolve_system_prompt(&self) -> String {
        if let Some(prompt) = self.system_prompt.as_ref().filter(|p| !p.trim().is_empty()) {
            return prompt.clone();
        }
        if let Some(path) = &self.system_prompt_path {
            match std::fs::read_to_string(path) {
                Ok(s) if !s.trim().is_empty() => return s,
                Ok(_) => tracing::warn!(path = %path.display(), "system prompt file is empty, using default"),
                Err(e) => tracing::warn!(path = %path.display(), "failed to read system prompt: {}", e),
            }
        }
        DEFAULT_SYSTEM_PROMPT.to_string()
    }
}

/// LLM 厂商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Openai,
    Anthropic,
    Xai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Xai => "xai",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Openai => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::Xai => "XAI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Openai => openai::OPENAI_DEFAULT_MODEL,
            Self::Anthropic => anthropic::ANTHROPIC_DEFAULT_MODEL,
            Self::Xai => xai::XAI_DEFAULT_MODEL,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::Openai => openai::OPENAI_BASE_URL,
            Self::Anthropic => anthropic::ANTHROPIC_BASE_URL,
            Self::Xai => xai::XAI_BASE_URL,
        }
    }
}

/// [llm] 段：厂商、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: ProviderKind,
    /// 未设置时用厂商默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 仅 Anthropic 请求使用
    pub max_tokens: u32,
    pub timeouts: LlmTimeoutsSection,
    pub retry: RetryPolicy,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            max_tokens: 4096,
            timeouts: LlmTimeoutsSection::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒），重试不延长此值
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [agent] 段：迭代预算、工具超时、会话缓存相关的工具名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_iterations: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// 余额查询工具：成功结果进入会话缓存
    pub balance_tool: String,
    pub balance_ttl_secs: u64,
    /// 成功后使余额缓存失效的工具（交易类）
    pub state_changing_tools: Vec<String>,
    /// query 为空时用用户输入补全的搜索类工具
    pub query_autofill_tools: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            tool_timeout_secs: 30,
            balance_tool: "get_balance".to_string(),
            balance_ttl_secs: 60,
            state_changing_tools: [
                "pump_fun_buy",
                "pump_fun_sell",
                "jupiter_swap",
                "smart_buy",
                "hyperliquid_market_order",
                "hyperliquid_close_position",
                "transfer_sol",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            query_autofill_tools: vec!["search_web".to_string(), "search_news".to_string()],
        }
    }
}

/// [fallback] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FallbackSection {
    pub enabled: bool,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// 从 config 目录加载配置，环境变量 SAM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SAM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SAM")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("agent.state_changing_tools")
            .with_list_parse_key("agent.query_autofill_tools")
            .with_list_parse_key("guard.single_shot_tools")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, ProviderKind::Openai);
        assert_eq!(cfg.llm.max_tokens, 4096);
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.llm.retry.max_retries, 3);
        assert_eq!(cfg.agent.max_iterations, 5);
        assert_eq!(cfg.agent.balance_tool, "get_balance");
        assert_eq!(cfg.guard.error_streak_limit, 3);
        assert!(cfg.fallback.enabled);
    }

    #[test]
    fn test_provider_defaults() {
        assert_eq!(ProviderKind::Xai.default_model(), "grok-2-latest");
        assert_eq!(ProviderKind::Anthropic.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(ProviderKind::Openai.default_base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sam.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
[llm]
provider = "anthropic"
max_tokens = 1024

[agent]
max_iterations = 8

[guard.call_limits]
pump_fun_buy = 2
"#
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.llm.provider, ProviderKind::Anthropic);
        assert_eq!(cfg.llm.max_tokens, 1024);
        assert_eq!(cfg.agent.max_iterations, 8);
        assert_eq!(cfg.guard.call_limits.get("pump_fun_buy"), Some(&2));
        assert_eq!(cfg.agent.tool_timeout_secs, 30);
    }

    #[test]
    fn test_inline_prompt_wins() {
        let section = AppSection {
            system_prompt: Some("custom".into()),
            system_prompt_path: Some(PathBuf::from("/nonexistent")),
            ..AppSection::default()
        };
        assert_eq!(section.resolve_system_prompt(), "custom");
        let fallback = AppSection {
            system_prompt_path: Some(PathBuf::from("/nonexistent/prompt.md")),
            ..AppSection::default()
        };
        assert_eq!(fallback.resolve_system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }
}
