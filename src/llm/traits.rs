//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete 返回回复文本与本次调用的 token 用量。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// LLM 调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    ApiError(String),

    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    /// 模型有回复但无法解析为期望的结构化输出
    #[error("Malformed structured output: {0}")]
    MalformedOutput(String),

    #[error("Failed to build request: {0}")]
    RequestBuild(String),
}

/// Token 使用统计：prompt / completion / total，跨步骤累加
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt: u64, completion: u64) -> Self {
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        }
    }

    /// 累加另一次调用的用量（单调不减）
    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// 单次补全结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub content: String,
    pub usage: TokenUsage,
}

impl Completion {
    pub fn new(content: impl Into<String>, usage: TokenUsage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_is_additive() {
        let mut total = TokenUsage::default();
        let steps = [
            TokenUsage::new(120, 30),
            TokenUsage::new(80, 12),
            TokenUsage::new(300, 95),
        ];
        for s in &steps {
            total.add(s);
        }
        assert_eq!(total.prompt_tokens, 500);
        assert_eq!(total.completion_tokens, 137);
        assert_eq!(total.total_tokens, 637);
    }

    #[test]
    fn test_token_usage_serializes_with_openai_keys() {
        let json = serde_json::to_value(TokenUsage::new(3, 4)).unwrap();
        assert_eq!(json["prompt_tokens"], 3);
        assert_eq!(json["completion_tokens"], 4);
        assert_eq!(json["total_tokens"], 7);
    }
}
