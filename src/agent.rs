//! Headless Agent 运行时（组合根）
//!
//! 一次性完成所有装配：从配置选择厂商适配器、包装外部工具、打开会话存储，
//! 构建 Orchestrator。之后 process_message 对单条用户输入跑一轮并返回最终回复。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::{AgentError, Orchestrator, OrchestratorSettings};
use crate::events::AgentEvent;
use crate::fallback::FallbackPolicy;
use crate::llm::{create_adapter_from_config, ProviderAdapter};
use crate::memory::{JsonFileSessionStore, SessionStore};
use crate::tools::{ToolExecutor, ToolInvoker};

/// 预构建的 Agent 组件，可多会话共享（同一会话的并发轮次由调用方串行化）
pub struct AgentComponents {
    pub orchestrator: Orchestrator,
    pub store: Arc<dyn SessionStore>,
}

/// 用给定适配器、工具与存储构建 Orchestrator（参数均来自配置）
pub fn build_orchestrator(
    cfg: &AppConfig,
    adapter: Arc<dyn ProviderAdapter>,
    invoker: Arc<dyn ToolInvoker>,
    store: Arc<dyn SessionStore>,
) -> Orchestrator {
    let fallback = if cfg.fallback.enabled {
        FallbackPolicy::standard()
    } else {
        FallbackPolicy::none()
    };
    Orchestrator::new(
        adapter,
        ToolExecutor::new(invoker, cfg.agent.tool_timeout_secs),
        store,
        cfg.app.resolve_system_prompt(),
    )
    .with_settings(OrchestratorSettings::from_config(cfg))
    .with_fallback(fallback)
}

/// 创建 Agent 组件：适配器由配置决定（缺少 API Key 时报 Config 错误），会话存到 sessions_dir
pub fn create_agent_components(
    cfg: &AppConfig,
    invoker: Arc<dyn ToolInvoker>,
    event_tx: Option<UnboundedSender<AgentEvent>>,
) -> Result<AgentComponents, AgentError> {
    let adapter = create_adapter_from_config(cfg)?;
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileSessionStore::new(&cfg.app.sessions_dir));
    let mut orchestrator = build_orchestrator(cfg, adapter, invoker, store.clone());
    if let Some(tx) = event_tx {
        orchestrator = orchestrator.with_event_tx(tx);
    }
    tracing::info!(
        sessions_dir = %cfg.app.sessions_dir.display(),
        tools = orchestrator.catalog().len(),
        "agent components ready"
    );
    Ok(AgentComponents { orchestrator, store })
}

/// 处理单条消息：跑一轮并返回回复文本
pub async fn process_message(components: &AgentComponents, session_id: &str, user_input: &str) -> String {
    components.orchestrator.run(session_id, user_input).await
}
