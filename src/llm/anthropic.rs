//! Anthropic 适配器（content block 格式）
//!
//! 与 OpenAI 格式的主要差异：
//! - system 不在 messages 中，所有 system 消息以 "\n\n" 拼接后放到顶层 `system` 字段
//! - 带工具调用的 assistant 消息 → `text` + `tool_use` blocks；紧随其后的 tool 消息合并为一条 user 消息（`tool_result` blocks）
//! - 没有对应结果的 `tool_use` 会补一个 `{"status":"pending"}` 的占位结果，保证 user/assistant 严格交替
//! - 相邻同角色消息合并

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::{HttpTransport, LlmError, ModelReply, ProviderAdapter, RetryPolicy, Usage};
use crate::memory::{Message, Role, ToolCallRequest};
use crate::tools::ToolSpec;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

const VENDOR: &str = "anthropic";

/// 未返回结果的 tool_use 的占位内容
const PENDING_RESULT: &str = r#"{"status":"pending"}"#;

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    http: HttpTransport,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicAdapter {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        max_tokens: u32,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http: HttpTransport::new(timeout, retry),
            base_url: base_url.unwrap_or(ANTHROPIC_BASE_URL).trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            max_tokens,
        }
    }

    pub fn build_request(&self, conversation: &[Message], tools: &[ToolSpec]) -> Value {
        let (system, messages) = convert_messages(conversation);
        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            body["tools"] = Value::Array(to_wire_tools(tools));
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        VENDOR
    }

    async fn send(&self, conversation: &[Message], tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        let body = self.build_request(conversation, tools);
        let url = format!("{}/v1/messages", self.base_url);
        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];
        tracing::debug!(
            vendor = VENDOR,
            messages = conversation.len(),
            tools = tools.len(),
            "sending messages request"
        );
        let data = self.http.post_json(VENDOR, &url, &headers, &body).await?;
        parse_response(&data)
    }
}

/// 规范对话 → (顶层 system, Anthropic messages)
pub fn convert_messages(conversation: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut out: Vec<(&'static str, Vec<Value>)> = Vec::new();

    let mut i = 0;
    while i < conversation.len() {
        let m = &conversation[i];
        i += 1;
        match m.role {
            Role::System => {
                if !m.content.is_empty() {
                    system_parts.push(&m.content);
                }
            }
            Role::User => {
                if !m.content.is_empty() {
                    push_blocks(&mut out, "user", vec![text_block(&m.content)]);
                }
            }
            Role::Assistant if m.has_tool_calls() => {
                let mut blocks = Vec::with_capacity(m.tool_calls.len() + 1);
                if !m.content.is_empty() {
                    blocks.push(text_block(&m.content));
                }
                for call in &m.tool_calls {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.tool_name,
                        "input": Value::Object(call.arguments.clone()),
                    }));
                }
                push_blocks(&mut out, "assistant", blocks);

                // 收集紧随其后的 tool 消息
                let mut answered: HashSet<&str> = HashSet::new();
                let mut results = Vec::new();
                while i < conversation.len() && conversation[i].role == Role::Tool {
                    let t = &conversation[i];
                    let id = t.tool_call_id.as_deref().unwrap_or_default();
                    answered.insert(id);
                    results.push(tool_result_block(id, &t.content));
                    i += 1;
                }
                for call in &m.tool_calls {
                    if !answered.contains(call.id.as_str()) {
                        results.push(tool_result_block(&call.id, PENDING_RESULT));
                    }
                }
                push_blocks(&mut out, "user", results);
            }
            Role::Assistant => {
                if !m.content.is_empty() {
                    push_blocks(&mut out, "assistant", vec![text_block(&m.content)]);
                }
            }
            Role::Tool => {
                // 没有前置 tool_use 的结果：以文本形式交给 user，避免引用不存在的 tool_use id
                let name = m.tool_name.as_deref().unwrap_or("tool");
                let text = format!("[{} result] {}", name, m.content);
                push_blocks(&mut out, "user", vec![text_block(&text)]);
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    let messages = out
        .into_iter()
        .map(|(role, content)| json!({"role": role, "content": content}))
        .collect();
    (system, messages)
}

fn push_blocks(out: &mut Vec<(&'static str, Vec<Value>)>, role: &'static str, blocks: Vec<Value>) {
    if blocks.is_empty() {
        return;
    }
    match out.last_mut() {
        Some((last_role, content)) if *last_role == role => content.extend(blocks),
        _ => out.push((role, blocks)),
    }
}

fn text_block(text: &str) -> Value {
    json!({"type": "text", "text": text})
}

fn tool_result_block(tool_use_id: &str, content: &str) -> Value {
    json!({"type": "tool_result", "tool_use_id": tool_use_id, "content": content})
}

/// 工具目录 → `{name, description, input_schema}`
pub fn to_wire_tools(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.parameters(),
            })
        })
        .collect()
}

/// 解析 `/v1/messages` 响应：text blocks 拼接为文本，tool_use blocks 转为 ToolCallRequest
pub fn parse_response(data: &Value) -> Result<ModelReply, LlmError> {
    let blocks = data
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::protocol(VENDOR, None, "No content blocks in LLM response"))?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("toolu_{}", uuid::Uuid::new_v4().simple()));
                let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = match block.get("input") {
                    Some(Value::Object(map)) => map.clone(),
                    Some(Value::Null) | None => Default::default(),
                    Some(other) => {
                        tracing::error!(vendor = VENDOR, tool = name, "tool_use input is not an object: {}", other);
                        Default::default()
                    }
                };
                tool_calls.push(ToolCallRequest::new(id, name, arguments));
            }
            other => {
                tracing::debug!(vendor = VENDOR, "ignoring content block {:?}", other);
            }
        }
    }

    let usage = data
        .get("usage")
        .map(|u| {
            let field = |k: &str| u.get(k).and_then(Value::as_u64).unwrap_or(0);
            Usage::new(field("input_tokens"), field("output_tokens"))
        })
        .unwrap_or_default();

    Ok(ModelReply {
        text,
        tool_calls,
        usage,
    })
}
