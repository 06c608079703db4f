//! LLM 层：厂商适配器抽象与实现（OpenAI 兼容 / xAI / Anthropic / 脚本化 Mock）

pub mod anthropic;
pub mod http;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;
pub mod xai;

use std::sync::Arc;
use std::time::Duration;

pub use anthropic::AnthropicAdapter;
pub use http::HttpTransport;
pub use mock::ScriptedAdapter;
pub use openai::OpenAiAdapter;
pub use retry::{send_with_retry, RetryPolicy};
pub use traits::{LlmError, ModelReply, ProviderAdapter, Usage};
pub use xai::XaiAdapter;

use crate::config::{AppConfig, ProviderKind};
use crate::core::AgentError;

/// 根据配置创建适配器（组合根调用一次，之后作为 Arc<dyn ProviderAdapter> 注入 Orchestrator）
pub fn create_adapter_from_config(cfg: &AppConfig) -> Result<Arc<dyn ProviderAdapter>, AgentError> {
    let llm = &cfg.llm;
    let api_key = std::env::var(llm.provider.api_key_env()).map_err(|_| {
        AgentError::Config(format!(
            "{} not set (required for provider '{}')",
            llm.provider.api_key_env(),
            llm.provider.as_str()
        ))
    })?;
    let model = llm
        .model
        .clone()
        .unwrap_or_else(|| llm.provider.default_model().to_string());
    let base_url = llm.base_url.as_deref();
    let timeout = Duration::from_secs(llm.timeouts.request);

    let adapter: Arc<dyn ProviderAdapter> = match llm.provider {
        ProviderKind::Openai => Arc::new(OpenAiAdapter::new(base_url, &model, &api_key, timeout, llm.retry)),
        ProviderKind::Xai => Arc::new(XaiAdapter::new(base_url, &model, &api_key, timeout, llm.retry)),
        ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(
            base_url,
            &model,
            &api_key,
            llm.max_tokens,
            timeout,
            llm.retry,
        )),
    };
    tracing::info!(provider = llm.provider.as_str(), model = %model, "LLM adapter ready");
    Ok(adapter)
}
