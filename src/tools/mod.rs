//! 工具层：调用契约（ToolInvoker）、默认注册表与带超时的执行器

pub mod executor;
pub mod registry;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolCallResult, ToolInvoker, ToolRegistry, ToolSpec};
