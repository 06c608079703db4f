//! 脚本化适配器（用于测试，无需 API）
//!
//! 两种用法：按顺序返回预设回复，或用闭包根据调用序号与当前对话生成回复。
//! 每次调用收到的对话都会被记录，便于断言发送给模型的内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmError, ModelReply, ProviderAdapter};
use crate::memory::Message;
use crate::tools::ToolSpec;

type ReplyFn = Box<dyn Fn(usize, &[Message]) -> Result<ModelReply, LlmError> + Send + Sync>;

enum Script {
    Sequence(Mutex<VecDeque<Result<ModelReply, LlmError>>>),
    Generator(ReplyFn),
}

/// 脚本化适配器
pub struct ScriptedAdapter {
    script: Script,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedAdapter {
    /// 依次返回 replies；用尽后返回纯文本 "done"
    pub fn sequence(replies: Vec<Result<ModelReply, LlmError>>) -> Self {
        Self {
            script: Script::Sequence(Mutex::new(replies.into())),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 每次调用执行 f(调用序号, 对话)
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(usize, &[Message]) -> Result<ModelReply, LlmError> + Send + Sync + 'static,
    {
        Self {
            script: Script::Generator(Box::new(f)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 每次调用收到的对话快照
    pub fn conversations(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl std::fmt::Debug for ScriptedAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedAdapter")
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, conversation: &[Message], _tools: &[ToolSpec]) -> Result<ModelReply, LlmError> {
        let n = {
            let mut seen = self
                .seen
                .lock()
                .map_err(|_| LlmError::transport("scripted", "script lock poisoned"))?;
            seen.push(conversation.to_vec());
            seen.len() - 1
        };
        match &self.script {
            Script::Sequence(queue) => {
                let next = queue
                    .lock()
                    .map_err(|_| LlmError::transport("scripted", "script lock poisoned"))?
                    .pop_front();
                next.unwrap_or_else(|| Ok(ModelReply::text("done")))
            }
            Script::Generator(f) => f(n, conversation),
        }
    }
}
