//! 持久化网关：会话与消息记录的读写契约
//!
//! 核心只依赖 ChatStore trait；SQLite 实现见 async_persistence。消息只追加，不更新不删除。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::TokenUsage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode/decode JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid timestamp in database: {0}")]
    Timestamp(String),
}

/// 会话：首次接触时创建
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub api_version: String,
}

impl SessionRecord {
    /// 生成新的 UUID v4 会话
    pub fn new(api_version: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), api_version)
    }

    pub fn with_id(id: impl Into<String>, api_version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: Utc::now(),
            api_version: api_version.into(),
        }
    }
}

/// 待写入的一轮对话结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMessage {
    pub session_id: String,
    pub user_name: Option<String>,
    pub user_message: String,
    pub answer: String,
    pub language: Option<String>,
    pub tokens_used: TokenUsage,
    /// 本轮各步骤的 partial state（JSON 对象）
    pub state: serde_json::Value,
}

/// 已持久化的一轮对话
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub user_name: Option<String>,
    pub user_message: String,
    pub answer: String,
    pub language: Option<String>,
    pub tokens_used: TokenUsage,
    pub state: serde_json::Value,
}

/// 持久化网关
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// 原子写入会话，失败返回错误
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError>;

    /// 原子写入一轮消息，返回自增 id；会话行不存在时在同一事务中补建
    async fn save_message(&self, message: &NewMessage, api_version: &str) -> Result<i64, StorageError>;

    /// 某会话最近 n 条消息，按新到旧排列
    async fn retrieve_last_n(&self, session_id: &str, n: usize) -> Result<Vec<MessageRecord>, StorageError>;

    /// 全表最新一条消息（不限会话）
    async fn retrieve_most_recent_global(&self) -> Result<Option<MessageRecord>, StorageError>;
}
