//! 适配器共用的 HTTP 发送
//!
//! 状态码映射：连接失败 / 超时 / 5xx → Transport（可重试）；其它非 2xx 或响应体不是合法 JSON → Protocol。

use std::time::Duration;

use serde_json::Value;

use crate::llm::{send_with_retry, LlmError, RetryPolicy};

/// 错误信息中保留的响应体最大字符数
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

/// JSON POST 客户端：持有 reqwest::Client、单次请求超时与重试策略
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            retry,
        }
    }

    /// 带重试的 POST，返回解析后的 JSON 响应体
    pub async fn post_json(
        &self,
        vendor: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, LlmError> {
        send_with_retry(&self.retry, vendor, move || self.post_once(vendor, url, headers, body)).await
    }

    async fn post_once(
        &self,
        vendor: &str,
        url: &str,
        headers: &[(&str, String)],
        body: &Value,
    ) -> Result<Value, LlmError> {
        let mut request = self.client.post(url).timeout(self.timeout).json(body);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::transport(vendor, e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::transport(vendor, format!("failed to read response body: {e}")))?;

        decode_response(vendor, status, &text)
    }
}

/// 按状态码与响应体得到结果：5xx → Transport；其它非 2xx → Protocol；2xx 但不是合法 JSON → Protocol
pub(crate) fn decode_response(vendor: &str, status: reqwest::StatusCode, text: &str) -> Result<Value, LlmError> {
    if status.is_server_error() {
        return Err(LlmError::transport(
            vendor,
            format!("server error {}: {}", status.as_u16(), preview(text)),
        ));
    }
    if !status.is_success() {
        return Err(LlmError::protocol(vendor, Some(status.as_u16()), preview(text)));
    }
    tracing::debug!(vendor, bytes = text.len(), "LLM response received");
    serde_json::from_str(text).map_err(|e| {
        LlmError::protocol(vendor, Some(status.as_u16()), format!("invalid JSON response: {e}"))
    })
}

fn preview(text: &str) -> String {
    if text.chars().count() > ERROR_BODY_PREVIEW_CHARS {
        format!("{}...", text.chars().take(ERROR_BODY_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}
