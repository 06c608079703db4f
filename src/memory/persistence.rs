//! 会话持久化
//!
//! Orchestrator 只依赖 SessionStore：load(session_id) / save(session_id, messages) / clear(session_id)。
//! 提供两种实现：进程内 HashMap（测试与单进程）与每会话一个 JSON 文件。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::memory::Message;

/// 会话存储：保存的消息不含 system prompt，由 Orchestrator 决定写入哪些消息
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 加载会话历史；不存在时返回空 Vec
    async fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>>;

    /// 覆盖写入会话历史
    async fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()>;

    /// 删除会话历史
    async fn clear(&self, session_id: &str) -> anyhow::Result<()>;
}

/// 进程内存储
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一段历史（测试用）
    pub async fn seed(&self, session_id: &str, messages: Vec<Message>) {
        self.sessions.lock().await.insert(session_id.to_string(), messages);
    }

    /// 读取当前保存的内容（不存在时为 None，用于区分「从未保存」与「保存了空列表」）
    pub async fn snapshot(&self, session_id: &str) -> Option<Vec<Message>> {
        self.sessions.lock().await.get(session_id).cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        Ok(self.snapshot(session_id).await.unwrap_or_default())
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()> {
        self.sessions
            .lock()
            .await
            .insert(session_id.to_string(), messages.to_vec());
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> anyhow::Result<()> {
        self.sessions.lock().await.remove(session_id);
        Ok(())
    }
}

/// 文件存储：`<root>/<session_id>.json`，内容为 Message 数组
#[derive(Debug, Clone)]
pub struct JsonFileSessionStore {
    root: PathBuf,
}

impl JsonFileSessionStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// session_id 中除字母数字与 `-`、`_` 外的字符替换为 `_`，避免路径逃逸
    fn path_for(&self, session_id: &str) -> PathBuf {
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl SessionStore for JsonFileSessionStore {
    async fn load(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let path = self.path_for(session_id);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        Ok(serde_json::from_str(&data)?)
    }

    async fn save(&self, session_id: &str, messages: &[Message]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let data = serde_json::to_string_pretty(messages)?;
        tokio::fs::write(self.path_for(session_id), data).await?;
        Ok(())
    }

    async fn clear(&self, session_id: &str) -> anyhow::Result<()> {
        let path = self.path_for(session_id);
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }
}
