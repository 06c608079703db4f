//! OpenAI 兼容适配器（function calling）
//!
//! 请求：`{model, messages, tools?, tool_choice?}`，有工具时 tool_choice 固定为 "auto"。
//! 响应：取 `choices[0].message`；tool_calls 的 arguments 是字符串编码的 JSON，解析失败时记录日志并退化为空参数。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::core::AgentError;
use crate::llm::{HttpTransport, LlmError, ModelReply, ProviderAdapter, RetryPolicy, Usage};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolSpec;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI 兼容适配器：可指向任意兼容端点（base_url 可配置）
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    vendor: String,
    http: HttpTransport,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiAdapter {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            vendor: "openai".to_string(),
            http: HttpTransport::new(timeout, retry),
            base_url: base_url.unwrap_or(OPENAI_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// 复用同一线上格式的其它厂商（如 xAI）改名用
    pub(crate) fn with_vendor(mut self, vendor: &str) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    /// 构造请求体（纯函数，便于测试）
    pub fn build_request(&self, conversation: &[Message], tools: &[ToolSpec]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": to_wire_messages(conversation),
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(to_wire_tools(tools));
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        &self.vendor
    }

    async fn send(&self, conversation: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        let body = self.build_request(conversation, tools);
        let url = format!("{}/chat/completions", self.base_url);
        let headers = [("Authorization", format!("Bearer {}", self.api_key))];
        tracing::debug!(
            vendor = %self.vendor,
            messages = conversation.len(),
            tools = tools.len(),
            "sending chat completion"
        );
        let data = self.http.post_json(&self.vendor, &url, &headers, &body).await?;
        parse_response(&self.vendor, &data)
    }
}

/// 规范消息 → OpenAI messages
pub fn to_wire_messages(conversation: &[Message]) -> Vec<Value> {
    conversation.iter().map(to_wire_message).collect()
}

fn to_wire_message(m: &Message) -> Value {
    match m.role {
        Role::System => json!({"role": "system", "content": m.content}),
        Role::User => json!({"role": "user", "content": m.content}),
        Role::Assistant if m.has_tool_calls() => {
            let calls: Vec<Value> = m
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {"name": c.tool_name, "arguments": c.arguments_json()},
                    })
                })
                .collect();
            let content = if m.content.is_empty() {
                Value::Null
            } else {
                Value::String(m.content.clone())
            };
            json!({"role": "assistant", "content": content, "tool_calls": calls})
        }
        Role::Assistant => json!({"role": "assistant", "content": m.content}),
        Role::Tool => {
            let mut v = json!({
                "role": "tool",
                "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
                "content": m.content,
            });
            if let Some(name) = &m.tool_name {
                v["name"] = json!(name);
            }
            v
        }
    }
}

/// 工具目录 → `{type: "function", function: {name, description, parameters}}`
pub fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters(),
                },
            })
        })
        .collect()
}

/// 解析 chat/completions 响应
pub fn parse_response(vendor: &str, data: &Value) -> Result<ModelReply, LlmError> {
    let message = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| LlmError::protocol(vendor, None, "No choices in LLM response"))?;

    // 部分厂商在返回工具调用时 content 为 null
    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().map(|c| decode_tool_call(vendor, c)).collect())
        .unwrap_or_default();

    let usage = data.get("usage").map(parse_usage).unwrap_or_default();
    Ok(ModelReply {
        text,
        tool_calls,
        usage,
    })
}

fn decode_tool_call(vendor: &str, call: &Value) -> ToolCallRequest {
    let id = call
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
    let function = call.get("function");
    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let arguments = decode_arguments(vendor, &name, function.and_then(|f| f.get("arguments")));
    ToolCallRequest::new(id, name, arguments)
}

/// 字符串编码的参数 → 结构化对象；缺失、格式错误或非对象时返回空对象
pub fn decode_arguments(vendor: &str, tool_name: &str, raw: Option<&Value>) -> Map<String, Value> {
    try_decode_arguments(raw).unwrap_or_else(|e| {
        tracing::error!(vendor, tool = tool_name, "{}, using empty arguments", e);
        Map::new()
    })
}

/// 解析 arguments 字段；缺失或空字符串视为空参数
pub fn try_decode_arguments(raw: Option<&Value>) -> Result<Map<String, Value>, AgentError> {
    match raw {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(AgentError::ArgumentParse(format!("arguments are not an object: {other}"))),
            Err(e) => Err(AgentError::ArgumentParse(format!("invalid JSON: {e}"))),
        },
        Some(other) => Err(AgentError::ArgumentParse(format!("unexpected payload: {other}"))),
    }
}

fn parse_usage(usage: &Value) -> Usage {
    let field = |k: &str| usage.get(k).and_then(Value::as_u64).unwrap_or(0);
    let prompt = field("prompt_tokens");
    let completion = field("completion_tokens");
    let total = match field("total_tokens") {
        0 => prompt + completion,
        t => t,
    };
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    }
}
