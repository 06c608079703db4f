//! 工具执行器
//!
//! 包装 ToolInvoker：对每次调用施加超时（超时转为失败结果，归入 network 类），
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::guard::ErrorCategory;
use crate::tools::{ToolCallResult, ToolInvoker, ToolSpec};

/// 工具执行器：持有外部 ToolInvoker 与单次调用超时
#[derive(Clone)]
pub struct ToolExecutor {
    invoker: Arc<dyn ToolInvoker>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(invoker: Arc<dyn ToolInvoker>, timeout_secs: u64) -> Self {
        Self::with_timeout(invoker, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(invoker: Arc<dyn ToolInvoker>, timeout: Duration) -> Self {
        Self { invoker, timeout }
    }

    /// 执行指定工具；工具失败与超时都以 ToolCallResult 返回，不会报错
    pub async fn execute(&self, tool_name: &str, args: Map<String, Value>) -> ToolCallResult {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = match timeout(self.timeout, self.invoker.invoke(tool_name, args)).await {
            Ok(result) => result,
            Err(_) => ToolCallResult::failure(
                format!(
                    "Tool '{}' timeout after {}s",
                    tool_name,
                    self.timeout.as_secs_f64()
                ),
                Some(ErrorCategory::Network),
            ),
        };

        let outcome = match (&result.success, &result.error_category) {
            (true, _) => "ok",
            (false, Some(ErrorCategory::Network)) => "timeout_or_network",
            (false, _) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.success,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "tool");
        result
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.invoker.catalog()
    }
}

fn args_preview(args: &Map<String, Value>) -> String {
    let s = Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
