//! 记忆层：对话消息、历史重建、检索索引、持久化

pub mod async_persistence;
pub mod conversation;
pub mod history;
pub mod persistence;
pub mod rag;

pub use async_persistence::SqliteChatStore;
pub use conversation::{render_history, Message, Role};
pub use history::{HistoryReconstructor, PriorKnowledge};
pub use persistence::{ChatStore, MessageRecord, NewMessage, SessionRecord, StorageError};
pub use rag::{EmbeddingRetriever, RetrievalError, Retriever, Snippet, VectorIndex};
