//! 异步 SQLite 持久化（sqlx）
//!
//! sessions / messages 两张表；messages.tokens_used 与 messages.state 以 JSON 文本存储。
//! 每次写入都在事务内完成，失败回滚。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::memory::persistence::{ChatStore, MessageRecord, NewMessage, SessionRecord, StorageError};

/// 异步 SQLite 持久化
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    /// 打开（不存在则创建）数据库文件并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Database(sqlx::Error::Io(e)))?;
            }
        }
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;

        Ok(store)
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<(), StorageError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                api_version TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                user_name TEXT,
                user_message TEXT NOT NULL,
                answer TEXT NOT NULL,
                language TEXT,
                tokens_used TEXT NOT NULL,
                state TEXT NOT NULL,
                FOREIGN KEY (session_id) REFERENCES sessions(id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Timestamp(format!("{}: {}", raw, e)))
}

fn row_to_message(row: &SqliteRow) -> Result<MessageRecord, StorageError> {
    let created_at: String = row.try_get("created_at")?;
    let tokens_used: String = row.try_get("tokens_used")?;
    let state: String = row.try_get("state")?;
    Ok(MessageRecord {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        created_at: parse_ts(&created_at)?,
        user_name: row.try_get("user_name")?,
        user_message: row.try_get("user_message")?,
        answer: row.try_get("answer")?,
        language: row.try_get("language")?,
        tokens_used: serde_json::from_str(&tokens_used)?,
        state: serde_json::from_str(&state)?,
    })
}

const MESSAGE_COLUMNS: &str =
    "id, session_id, created_at, user_name, user_message, answer, language, tokens_used, state";

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
        let started = std::time::Instant::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO sessions (id, created_at, api_version) VALUES (?, ?, ?)")
            .bind(&session.id)
            .bind(session.created_at.to_rfc3339())
            .bind(&session.api_version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(
            "Session '{}' saved in {:.2}s",
            session.id,
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }

    async fn save_message(&self, message: &NewMessage, api_version: &str) -> Result<i64, StorageError> {
        let started = std::time::Instant::now();
        let now = Utc::now().to_rfc3339();
        let tokens_used = serde_json::to_string(&message.tokens_used)?;
        let state = serde_json::to_string(&message.state)?;

        let mut tx = self.pool.begin().await?;

        // 客户端带来的会话 id 若尚未登记，与消息同事务补建
        sqlx::query("INSERT OR IGNORE INTO sessions (id, created_at, api_version) VALUES (?, ?, ?)")
            .bind(&message.session_id)
            .bind(&now)
            .bind(api_version)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            "INSERT INTO messages (session_id, created_at, user_name, user_message, answer, language, tokens_used, state)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.session_id)
        .bind(&now)
        .bind(&message.user_name)
        .bind(&message.user_message)
        .bind(&message.answer)
        .bind(&message.language)
        .bind(&tokens_used)
        .bind(&state)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(
            "Message for session '{}' saved in {:.2}s",
            message.session_id,
            started.elapsed().as_secs_f64()
        );
        Ok(result.last_insert_rowid())
    }

    async fn retrieve_last_n(&self, session_id: &str, n: usize) -> Result<Vec<MessageRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM messages WHERE session_id = ? ORDER BY id DESC LIMIT ?",
            MESSAGE_COLUMNS
        ))
        .bind(session_id)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    async fn retrieve_most_recent_global(&self) -> Result<Option<MessageRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM messages ORDER BY id DESC LIMIT 1",
            MESSAGE_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;
    use tempfile::TempDir;

    fn new_message(session_id: &str, n: usize) -> NewMessage {
        NewMessage {
            session_id: session_id.to_string(),
            user_name: Some("Maria".to_string()),
            user_message: format!("pregunta {}", n),
            answer: format!("respuesta {}", n),
            language: Some("español".to_string()),
            tokens_used: TokenUsage::new(10, 5),
            state: serde_json::json!({ "rag": format!("borrador {}", n) }),
        }
    }

    #[tokio::test]
    async fn test_save_and_retrieve_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = SqliteChatStore::new(dir.path().join("test.db")).await.unwrap();
        let session = SessionRecord::new("0.1.0");
        store.save_session(&session).await.unwrap();

        for n in 1..=7 {
            store.save_message(&new_message(&session.id, n), "0.1.0").await.unwrap();
        }

        let last = store.retrieve_last_n(&session.id, 5).await.unwrap();
        assert_eq!(last.len(), 5);
        assert_eq!(last[0].user_message, "pregunta 7");
        assert_eq!(last[4].user_message, "pregunta 3");
        assert_eq!(last[0].tokens_used.total_tokens, 15);
        assert_eq!(last[0].state["rag"], "borrador 7");
    }

    #[tokio::test]
    async fn test_most_recent_global_spans_sessions() {
        let dir = TempDir::new().unwrap();
        let store = SqliteChatStore::new(dir.path().join("test.db")).await.unwrap();
        assert!(store.retrieve_most_recent_global().await.unwrap().is_none());

        let a = SessionRecord::new("0.1.0");
        let b = SessionRecord::new("0.1.0");
        store.save_session(&a).await.unwrap();
        store.save_session(&b).await.unwrap();
        store.save_message(&new_message(&a.id, 1), "0.1.0").await.unwrap();
        let mut other = new_message(&b.id, 2);
        other.user_name = Some("Juan".to_string());
        store.save_message(&other, "0.1.0").await.unwrap();

        let latest = store.retrieve_most_recent_global().await.unwrap().unwrap();
        assert_eq!(latest.session_id, b.id);
        assert_eq!(latest.user_name.as_deref(), Some("Juan"));
    }

    #[tokio::test]
    async fn test_duplicate_session_insert_fails() {
        let dir = TempDir::new().unwrap();
        let store = SqliteChatStore::new(dir.path().join("test.db")).await.unwrap();
        let session = SessionRecord::with_id("fixed", "0.1.0");
        store.save_session(&session).await.unwrap();
        assert!(store.save_session(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_session_is_adopted_on_message_save() {
        let dir = TempDir::new().unwrap();
        let store = SqliteChatStore::new(dir.path().join("test.db")).await.unwrap();
        let id = store
            .save_message(&new_message("client-made-id", 1), "0.1.0")
            .await
            .unwrap();
        assert!(id > 0);
        let history = store.retrieve_last_n("client-made-id", 5).await.unwrap();
        assert_eq!(history.len(), 1);
    }
}
