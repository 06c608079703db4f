//! 记忆层：规范格式的对话消息与会话持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{Message, Role, ToolCallRequest};
pub use persistence::{InMemorySessionStore, JsonFileSessionStore, SessionStore};
