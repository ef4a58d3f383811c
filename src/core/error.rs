//! Agent 错误类型
//!
//! 各层错误在此汇总；TurnExecutor 把步骤中的 AgentError 统一转为致歉回复，只有持久化写入失败会传到 HTTP 层。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::{RetrievalError, StorageError};
use crate::prompts::PromptError;

/// 一轮对话中可能出现的错误（模型、检索、模板、存储、配置）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// 检索成功返回但没有任何片段
    #[error("Vector store returned no snippets")]
    NoContext,

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    ConfigError(String),
}
