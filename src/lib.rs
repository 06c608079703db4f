//! SAM Agent - LLM 工具调用编排核心
//!
//! 模块划分：
//! - **agent**: 组合根（从配置装配适配器、工具执行器、会话存储）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: Orchestrator 状态机、错误、统计、会话缓存
//! - **events**: 对话过程事件（尽力投递）
//! - **fallback**: 工具失败时的替代调用表
//! - **guard**: 重复调用抑制、连续失败截断、失败分类
//! - **llm**: 厂商适配器（OpenAI 兼容 / xAI / Anthropic）与重试
//! - **memory**: 规范消息格式与会话持久化
//! - **observability**: tracing 初始化
//! - **tools**: 工具目录、调用契约与执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod events;
pub mod fallback;
pub mod guard;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod tools;

pub use core::{Orchestrator, TurnReport};
pub use llm::ProviderAdapter;
pub use tools::ToolInvoker;
