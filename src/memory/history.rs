//! 历史重建：每轮开始时从持久化消息恢复用户名、语言与最近对话
//!
//! 每个 HTTP 请求都是独立的一轮，没有常驻会话进程；会话上下文完全来自 messages 表。

use std::sync::Arc;

use crate::config::{HistorySection, ProfileScope};
use crate::memory::persistence::{ChatStore, MessageRecord, SessionRecord, StorageError};
use crate::memory::Message;
use crate::prompts::WELCOME_MESSAGE;

/// 一轮开始前已知的信息
#[derive(Debug, Clone, PartialEq)]
pub struct PriorKnowledge {
    pub session_id: String,
    pub user_name: Option<String>,
    pub language: Option<String>,
    /// 时间正序，user / assistant 成对相邻
    pub chat_history: Vec<Message>,
}

/// 历史重建器
pub struct HistoryReconstructor {
    store: Arc<dyn ChatStore>,
    limit: usize,
    profile_scope: ProfileScope,
    api_version: String,
}

impl HistoryReconstructor {
    pub fn new(store: Arc<dyn ChatStore>, config: &HistorySection, api_version: impl Into<String>) -> Self {
        Self {
            store,
            limit: config.limit,
            profile_scope: config.profile_scope,
            api_version: api_version.into(),
        }
    }

    /// 重建一轮的先验信息
    ///
    /// 会话 id 为空时新建会话（写入失败向上传播），并以一对合成欢迎语作为历史；
    /// 已有会话的读取失败只降级为空历史，保证这一轮总能开始。
    pub async fn reconstruct(&self, session_id: &str) -> Result<PriorKnowledge, StorageError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            let session = SessionRecord::new(self.api_version.clone());
            self.store.save_session(&session).await?;
            tracing::info!("Created new session '{}'", session.id);
            return Ok(PriorKnowledge {
                session_id: session.id,
                user_name: None,
                language: None,
                chat_history: welcome_history(),
            });
        }

        // 任一读取失败都整体降级：空历史，用户名与语言未知
        let (records, profile) = match self.load(session_id).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!("Failed to load history for session '{}': {}", session_id, e);
                (Vec::new(), None)
            }
        };

        let (user_name, language) = profile
            .map(|m| (non_empty(m.user_name), non_empty(m.language)))
            .unwrap_or((None, None));

        tracing::debug!(
            "Session '{}': {} prior message(s), user_name={:?}, language={:?}",
            session_id,
            records.len(),
            user_name,
            language
        );

        Ok(PriorKnowledge {
            session_id: session_id.to_string(),
            user_name,
            language,
            chat_history: chronological(&records),
        })
    }

    /// 读取最近记录（新到旧）与提供用户名、语言的那条记录
    async fn load(
        &self,
        session_id: &str,
    ) -> Result<(Vec<MessageRecord>, Option<MessageRecord>), StorageError> {
        let records = self.store.retrieve_last_n(session_id, self.limit).await?;
        let profile = match self.profile_scope {
            ProfileScope::Global => self.store.retrieve_most_recent_global().await?,
            ProfileScope::Session => records.first().cloned(),
        };
        Ok((records, profile))
    }
}

/// 新会话的合成历史：空的用户消息 + 欢迎语
pub fn welcome_history() -> Vec<Message> {
    vec![Message::user(""), Message::assistant(WELCOME_MESSAGE)]
}

/// 新到旧的记录按对反转为时间正序
fn chronological(records: &[MessageRecord]) -> Vec<Message> {
    records
        .iter()
        .rev()
        .flat_map(|r| [Message::user(r.user_message.clone()), Message::assistant(r.answer.clone())])
        .collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TokenUsage;
    use crate::memory::async_persistence::SqliteChatStore;
    use crate::memory::persistence::NewMessage;
    use crate::memory::Role;
    use async_trait::async_trait;
    use tempfile::TempDir;

    fn message(session_id: &str, n: usize, user_name: &str) -> NewMessage {
        NewMessage {
            session_id: session_id.to_string(),
            user_name: Some(user_name.to_string()),
            user_message: format!("pregunta {}", n),
            answer: format!("respuesta {}", n),
            language: Some("español".to_string()),
            tokens_used: TokenUsage::default(),
            state: serde_json::json!({}),
        }
    }

    async fn store(dir: &TempDir) -> Arc<SqliteChatStore> {
        Arc::new(SqliteChatStore::new(dir.path().join("h.db")).await.unwrap())
    }

    #[tokio::test]
    async fn test_last_five_in_chronological_pairs() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        for n in 1..=7 {
            store.save_message(&message("s1", n, "Maria"), "test").await.unwrap();
        }

        let reconstructor = HistoryReconstructor::new(store, &HistorySection::default(), "test");
        let prior = reconstructor.reconstruct("s1").await.unwrap();

        assert_eq!(prior.chat_history.len(), 10);
        for (i, pair) in prior.chat_history.chunks(2).enumerate() {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[0].content, format!("pregunta {}", i + 3));
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[1].content, format!("respuesta {}", i + 3));
        }
        assert_eq!(prior.user_name.as_deref(), Some("Maria"));
        assert_eq!(prior.language.as_deref(), Some("español"));
    }

    #[tokio::test]
    async fn test_empty_session_id_mints_session_with_welcome() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_message(&message("other", 1, "Juan"), "test").await.unwrap();

        let reconstructor =
            HistoryReconstructor::new(store.clone(), &HistorySection::default(), "test");
        let prior = reconstructor.reconstruct("").await.unwrap();

        assert!(!prior.session_id.is_empty());
        assert_eq!(prior.user_name, None);
        assert_eq!(prior.language, None);
        assert_eq!(prior.chat_history, welcome_history());

        // 新会话已登记，重复登记会失败
        let dup = SessionRecord::with_id(prior.session_id.clone(), "test");
        assert!(store.save_session(&dup).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_session_has_empty_history_but_global_profile() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_message(&message("other", 1, "Juan"), "test").await.unwrap();

        let reconstructor = HistoryReconstructor::new(store, &HistorySection::default(), "test");
        let prior = reconstructor.reconstruct("fresh").await.unwrap();

        assert!(prior.chat_history.is_empty());
        assert_eq!(prior.user_name.as_deref(), Some("Juan"));
    }

    #[tokio::test]
    async fn test_session_scope_ignores_other_sessions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir).await;
        store.save_message(&message("mine", 1, "Maria"), "test").await.unwrap();
        store.save_message(&message("other", 1, "Juan"), "test").await.unwrap();

        let config = HistorySection {
            profile_scope: ProfileScope::Session,
            ..Default::default()
        };
        let reconstructor = HistoryReconstructor::new(store, &config, "test");

        let mine = reconstructor.reconstruct("mine").await.unwrap();
        assert_eq!(mine.user_name.as_deref(), Some("Maria"));
        let fresh = reconstructor.reconstruct("fresh").await.unwrap();
        assert_eq!(fresh.user_name, None);
    }

    struct BrokenStore;

    #[async_trait]
    impl ChatStore for BrokenStore {
        async fn save_session(&self, _session: &SessionRecord) -> Result<(), StorageError> {
            Err(StorageError::Timestamp("down".to_string()))
        }

        async fn save_message(&self, _message: &NewMessage, _api_version: &str) -> Result<i64, StorageError> {
            Err(StorageError::Timestamp("down".to_string()))
        }

        async fn retrieve_last_n(&self, _session_id: &str, _n: usize) -> Result<Vec<MessageRecord>, StorageError> {
            Err(StorageError::Timestamp("down".to_string()))
        }

        async fn retrieve_most_recent_global(&self) -> Result<Option<MessageRecord>, StorageError> {
            Err(StorageError::Timestamp("down".to_string()))
        }
    }

    #[tokio::test]
    async fn test_read_failure_degrades_to_defaults() {
        let reconstructor =
            HistoryReconstructor::new(Arc::new(BrokenStore), &HistorySection::default(), "test");
        let prior = reconstructor.reconstruct("s1").await.unwrap();
        assert_eq!(prior.session_id, "s1");
        assert!(prior.chat_history.is_empty());
        assert_eq!(prior.user_name, None);
        assert_eq!(prior.language, None);
    }

    /// 会话历史读取失败，全局最近消息可读
    struct HistoryReadFails {
        inner: Arc<SqliteChatStore>,
    }

    #[async_trait]
    impl ChatStore for HistoryReadFails {
        async fn save_session(&self, session: &SessionRecord) -> Result<(), StorageError> {
            self.inner.save_session(session).await
        }

        async fn save_message(&self, message: &NewMessage, api_version: &str) -> Result<i64, StorageError> {
            self.inner.save_message(message, api_version).await
        }

        async fn retrieve_last_n(&self, _session_id: &str, _n: usize) -> Result<Vec<MessageRecord>, StorageError> {
            Err(StorageError::Timestamp("down".to_string()))
        }

        async fn retrieve_most_recent_global(&self) -> Result<Option<MessageRecord>, StorageError> {
            self.inner.retrieve_most_recent_global().await
        }
    }

    #[tokio::test]
    async fn test_partial_read_failure_also_drops_profile() {
        let dir = TempDir::new().unwrap();
        let inner = store(&dir).await;
        let mut juan = message("other", 1, "Juan");
        juan.language = Some("inglés".to_string());
        inner.save_message(&juan, "test").await.unwrap();

        let reconstructor = HistoryReconstructor::new(
            Arc::new(HistoryReadFails { inner }),
            &HistorySection::default(),
            "test",
        );
        let prior = reconstructor.reconstruct("s1").await.unwrap();

        assert!(prior.chat_history.is_empty());
        assert_eq!(prior.user_name, None);
        assert_eq!(prior.language, None);
    }

    #[tokio::test]
    async fn test_new_session_write_failure_propagates() {
        let reconstructor =
            HistoryReconstructor::new(Arc::new(BrokenStore), &HistorySection::default(), "test");
        assert!(reconstructor.reconstruct("").await.is_err());
    }
}
