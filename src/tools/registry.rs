//! 工具注册表与调用契约
//!
//! Orchestrator 只依赖 ToolInvoker（invoke / catalog）。ToolRegistry 是默认实现：
//! 所有工具实现 Tool trait，按注册顺序输出目录；调用前按 schema 的 `required` 做边界校验，
//! 未知工具返回 not_found 失败而不是报错。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::guard::ErrorCategory;

/// 工具目录条目：名称、描述（供 LLM 理解）、输入参数 JSON Schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// 由参数类型生成 schema（draft 2019-09，嵌套类型放在 `$defs` 下）
    pub fn from_schema<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let generator = SchemaSettings::draft2019_09().into_generator();
        let root = generator.into_root_schema_for::<T>();
        let schema = serde_json::to_value(root).unwrap_or_else(|_| json!({"type": "object"}));
        Self::new(name, description, schema)
    }

    /// 发送给 LLM 的参数 schema：部分工具把 schema 包在 `{"parameters": {...}}` 里，此时取内层
    pub fn parameters(&self) -> &Value {
        match self.input_schema.get("parameters") {
            Some(inner) if inner.is_object() => inner,
            _ => &self.input_schema,
        }
    }

    /// 列出 schema `required` 中在 args 里缺失（或为 null）的字段
    pub fn missing_required(&self, args: &Map<String, Value>) -> Vec<String> {
        self.parameters()
            .get("required")
            .and_then(Value::as_array)
            .map(|required| {
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|field| args.get(*field).map_or(true, Value::is_null))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 一次工具调用的结果
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResult {
    pub success: bool,
    pub payload: Value,
    pub error_category: Option<ErrorCategory>,
}

impl ToolCallResult {
    pub fn ok(payload: Value) -> Self {
        Self {
            success: true,
            payload,
            error_category: None,
        }
    }

    pub fn failure(message: impl Into<String>, category: Option<ErrorCategory>) -> Self {
        Self {
            success: false,
            payload: json!({ "error": message.into() }),
            error_category: category,
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self::failure(format!("Tool '{name}' not found"), Some(ErrorCategory::NotFound))
    }

    /// 按载荷判断成败：有 `success` 字段时以其为准，否则以是否含 `error` 字段判断。
    /// 结构化错误（`{"error": true, "category": ...}`）直接采用其中的类别。
    pub fn from_payload(payload: Value) -> Self {
        let success = match payload.get("success") {
            Some(flag) => flag.as_bool().unwrap_or(false),
            None => payload.get("error").is_none(),
        };
        let error_category = if success {
            None
        } else {
            payload
                .get("category")
                .and_then(Value::as_str)
                .and_then(ErrorCategory::parse)
        };
        Self {
            success,
            payload,
            error_category,
        }
    }

    /// 失败时的错误描述：优先 `error` 字符串，其次结构化错误的 `message`
    pub fn error_message(&self) -> String {
        match self.payload.get("error") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Bool(true)) | None => self
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error")
                .to_string(),
            Some(other) => other.to_string(),
        }
    }

    /// `details.missing_fields`（校验失败时由工具给出）
    pub fn missing_fields(&self) -> Vec<String> {
        self.payload
            .pointer("/details/missing_fields")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// 写入 tool 消息的文本
    pub fn to_content(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// 工具调用契约（由外部提供具体工具）
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// 调用工具；未知工具返回 not_found 失败
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> ToolCallResult;

    /// 有序工具目录
    fn catalog(&self) -> Vec<ToolSpec>;
}

/// 单个工具：名称、描述、参数 schema、异步执行
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema，默认无参数
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具；返回的 JSON 载荷经 [`ToolCallResult::from_payload`] 判定成败，Err 视为失败
    async fn execute(&self, args: Map<String, Value>) -> Result<Value, String>;
}

/// 工具注册表：保留注册顺序
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具重复注册时替换实现，保留原位置
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn spec_of(tool: &dyn Tool) -> ToolSpec {
        ToolSpec::new(tool.name(), tool.description(), tool.parameters_schema())
    }
}

#[async_trait]
impl ToolInvoker for ToolRegistry {
    async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> ToolCallResult {
        let Some(tool) = self.get(name) else {
            return ToolCallResult::not_found(name);
        };
        let missing = Self::spec_of(tool.as_ref()).missing_required(&arguments);
        if !missing.is_empty() {
            return ToolCallResult {
                success: false,
                payload: json!({
                    "error": format!("Invalid arguments for '{name}': missing required fields"),
                    "details": { "missing_fields": missing },
                }),
                error_category: Some(ErrorCategory::Validation),
            };
        }
        match tool.execute(arguments).await {
            Ok(payload) => ToolCallResult::from_payload(payload),
            Err(e) => ToolCallResult::failure(format!("Tool execution failed: {e}"), None),
        }
    }

    fn catalog(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| Self::spec_of(tool.as_ref()))
            .collect()
    }
}
