//! xAI 适配器（严格 schema）
//!
//! 线上格式与 OpenAI 兼容适配器相同，区别只在发送前清洗每个工具的参数 schema：
//! 递归删除 `$defs`（引用先内联），并把只有一个选项的 `anyOf` 折叠为该选项本身。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::llm::{LlmError, ModelReply, OpenAiAdapter, ProviderAdapter, RetryPolicy};
use crate::memory::Message;
use crate::tools::ToolSpec;

pub const XAI_BASE_URL: &str = "https://api.x.ai/v1";
pub const XAI_DEFAULT_MODEL: &str = "grok-2-latest";

/// `$ref` 内联的最大深度（防止自引用类型无限展开）
const MAX_REF_DEPTH: usize = 8;

/// xAI 适配器：内部复用 OpenAiAdapter
#[derive(Debug, Clone)]
pub struct XaiAdapter {
    inner: OpenAiAdapter,
}

impl XaiAdapter {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        let inner = OpenAiAdapter::new(Some(base_url.unwrap_or(XAI_BASE_URL)), model, api_key, timeout, retry)
            .with_vendor("xai");
        Self { inner }
    }

    /// 清洗后的工具目录
    pub fn sanitize_tools(tools: &[ToolSpec]) -> Vec<ToolSpec> {
        tools
            .iter()
            .map(|t| ToolSpec {
                input_schema: sanitize_schema(t.parameters()),
                ..t.clone()
            })
            .collect()
    }

    pub fn build_request(&self, conversation: &[Message], tools: &[ToolSpec]) -> Value {
        self.inner.build_request(conversation, &Self::sanitize_tools(tools))
    }
}

#[async_trait]
impl ProviderAdapter for XaiAdapter {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, conversation: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        self.inner.send(conversation, &Self::sanitize_tools(tools)).await
    }
}

/// 清洗 schema：内联 `#/$defs/...` 引用、删除所有 `$defs`、折叠单选项 `anyOf`
pub fn sanitize_schema(schema: &Value) -> Value {
    let defs = schema
        .get("$defs")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    sanitize_node(schema, &defs, 0)
}

fn sanitize_node(node: &Value, defs: &Map<String, Value>, depth: usize) -> Value {
    match node {
        Value::Object(map) => {
            if let Some(name) = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix("#/$defs/"))
            {
                // 超过深度或找不到定义时以 {"type": "object"} 代替，避免删除 $defs 后留下悬空引用
                let mut resolved = match defs.get(name) {
                    Some(target) if depth < MAX_REF_DEPTH => match sanitize_node(target, defs, depth + 1) {
                        Value::Object(m) => m,
                        other => return other,
                    },
                    _ => {
                        tracing::debug!(reference = name, depth, "unresolved schema reference replaced with object");
                        let mut m = Map::new();
                        m.insert("type".to_string(), Value::String("object".to_string()));
                        m
                    }
                };
                // 引用节点上的其它键（如 description）保留并覆盖被引用定义
                for (k, v) in map {
                    if k != "$ref" && k != "$defs" {
                        resolved.insert(k.clone(), sanitize_node(v, defs, depth));
                    }
                }
                return collapse_single_any_of(resolved);
            }

            let mut out = Map::new();
            for (k, v) in map {
                if k == "$defs" {
                    continue;
                }
                out.insert(k.clone(), sanitize_node(v, defs, depth));
            }
            collapse_single_any_of(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| sanitize_node(v, defs, depth)).collect()),
        other => other.clone(),
    }
}

/// `{"anyOf": [X], ...rest}` → X 与 rest 合并（rest 中的键优先）
fn collapse_single_any_of(mut map: Map<String, Value>) -> Value {
    let single = matches!(map.get("anyOf"), Some(Value::Array(options)) if options.len() == 1);
    if !single {
        return Value::Object(map);
    }
    let option = match map.remove("anyOf") {
        Some(Value::Array(mut options)) => options.remove(0),
        _ => return Value::Object(map),
    };
    match option {
        Value::Object(mut merged) => {
            for (k, v) in map {
                merged.insert(k, v);
            }
            Value::Object(merged)
        }
        other if map.is_empty() => other,
        _ => Value::Object(map),
    }
}
