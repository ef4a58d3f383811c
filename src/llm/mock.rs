//! Mock 客户端（用于测试，无需 API）
//!
//! ScriptedLlmClient 按顺序返回预置的回复 / 错误 / 卡顿，并记录每次收到的消息；
//! MockEmbedder 用词袋哈希生成确定性向量，便于本地跑通检索。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{Completion, EmbeddingProvider, LlmClient, LlmError, TokenUsage};
use crate::memory::Message;

/// 脚本中的一步
#[derive(Debug)]
pub enum ScriptItem {
    Reply(Completion),
    Fail(LlmError),
    /// 睡眠指定时长后返回空回复，用于触发超时
    Stall(Duration),
}

/// 脚本化 LLM：脚本耗尽后返回 ApiError
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<ScriptItem>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, content: impl Into<String>) -> Self {
        self.reply_with_usage(content, TokenUsage::new(10, 5))
    }

    pub fn reply_with_usage(self, content: impl Into<String>, usage: TokenUsage) -> Self {
        self.push(ScriptItem::Reply(Completion::new(content, usage)))
    }

    pub fn fail(self, err: LlmError) -> Self {
        self.push(ScriptItem::Fail(err))
    }

    pub fn stall(self, duration: Duration) -> Self {
        self.push(ScriptItem::Stall(duration))
    }

    fn push(self, item: ScriptItem) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
        self
    }

    /// 已收到的调用次数
    pub fn calls(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 每次调用收到的完整消息列表
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        let next = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(ScriptItem::Reply(c)) => Ok(c),
            Some(ScriptItem::Fail(e)) => Err(e),
            Some(ScriptItem::Stall(d)) => {
                tokio::time::sleep(d).await;
                Ok(Completion::default())
            }
            None => Err(LlmError::ApiError("script exhausted".to_string())),
        }
    }
}

/// 词袋哈希嵌入：同词共现越多，余弦相似度越高
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dims: usize,
}

impl MockEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in word.as_bytes() {
            hash ^= *b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dims as u64) as usize
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut v = vec![0.0_f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2)
        {
            let idx = self.bucket(&word.to_lowercase());
            v[idx] += 1.0;
        }
        Ok(v)
    }
}
