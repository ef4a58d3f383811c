//! 模型调用重试策略：固定次数、固定退避、单次超时
//!
//! 所有尝试失败后把最后一次错误交还调用方（由 TurnExecutor 走致歉兜底），不做无限重试。

use std::future::Future;
use std::time::Duration;

use crate::config::LlmRetrySection;
use crate::llm::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    /// 单次尝试的时间上限
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
        }
    }
}

impl From<&LlmRetrySection> for RetryPolicy {
    fn from(section: &LlmRetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            backoff: Duration::from_secs(section.backoff_secs),
            timeout: Duration::from_secs(section.timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// 执行 op，失败（含超时）时按固定间隔重试，最多 max_attempts 次
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(r) => r,
                Err(_) => Err(LlmError::Timeout(self.timeout.as_secs())),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(e) if attempt < attempts => {
                    tracing::warn!("LLM attempt {}/{} failed: {}", attempt, attempts, e);
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!("LLM call failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }
}
