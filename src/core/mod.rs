//! 核心编排层：错误与兜底文案、单轮状态、会话统计与缓存、主控状态机

pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod stats;

pub use cache::SessionCache;
pub use error::AgentError;
pub use orchestrator::{Orchestrator, OrchestratorSettings, ANTI_REPEAT_NOTICE};
pub use state::{TurnOutcome, TurnPhase, TurnReport};
pub use stats::{SessionStats, StatsSnapshot};
