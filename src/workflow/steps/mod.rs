//! 四个步骤函数与共用的模型调用助手
//!
//! 每个调用模型的步骤都经过 StepContext::invoke / invoke_structured：
//! 渲染模板、按重试策略调用模型、累加 token、写 agent_outcome、记录 partial state。

mod compose;
mod request_language;
mod request_name;
mod retrieve;

use std::sync::Arc;
use std::time::Instant;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::AgentSettings;
use crate::core::AgentError;
use crate::llm::{format_instructions, parse_structured, LlmClient, LlmError, RetryPolicy};
use crate::memory::{Message, Retriever};
use crate::prompts::PromptTemplates;
use crate::workflow::state::TurnState;
use crate::workflow::types::{AgentOutcome, StepId};

pub use compose::compose;
pub use request_language::{request_language, LanguageDetection};
pub use request_name::{request_name, title_case, NameExtraction};
pub use retrieve::retrieve;

/// 步骤共享的依赖
pub struct StepContext {
    pub llm: Arc<dyn LlmClient>,
    pub retriever: Arc<dyn Retriever>,
    pub prompts: PromptTemplates,
    pub retry: RetryPolicy,
    pub settings: AgentSettings,
}

impl StepContext {
    /// 自由文本调用
    pub async fn invoke(
        &self,
        step: StepId,
        template: &str,
        vars: &[(&str, &str)],
        state: &mut TurnState,
    ) -> Result<String, AgentError> {
        let prompt = self.prompts.render(template, vars)?;
        let messages = [Message::user(prompt)];
        let started = Instant::now();

        let completion = self.retry.run(|| self.llm.complete(&messages)).await?;

        tracing::info!(
            "Step '{}' model call ({}) finished in {:.2}s, {} tokens",
            step,
            self.settings.chat_model,
            started.elapsed().as_secs_f64(),
            completion.usage.total_tokens
        );
        let outcome = AgentOutcome::text(completion.content.trim());
        state.add_usage(&completion.usage);
        state.set_outcome(outcome.clone());
        state.record_partial(step, outcome);
        Ok(completion.content.trim().to_string())
    }

    /// 结构化调用：模板中的 {format_instructions} 由目标类型的 JSON Schema 生成，解析失败同样重试
    pub async fn invoke_structured<T>(
        &self,
        step: StepId,
        template: &str,
        vars: &[(&str, &str)],
        state: &mut TurnState,
    ) -> Result<T, AgentError>
    where
        T: JsonSchema + DeserializeOwned + Serialize,
    {
        let instructions = format_instructions::<T>();
        let mut all_vars = vars.to_vec();
        all_vars.push(("format_instructions", instructions.as_str()));
        let prompt = self.prompts.render(template, &all_vars)?;
        let messages = [Message::user(prompt)];
        let started = Instant::now();

        let (completion, value) = self
            .retry
            .run(|| async {
                let completion = self.llm.complete(&messages).await?;
                let value = parse_structured::<T>(&completion.content)?;
                Ok::<_, LlmError>((completion, value))
            })
            .await?;

        tracing::info!(
            "Step '{}' model call ({}) finished in {:.2}s, {} tokens",
            step,
            self.settings.chat_model,
            started.elapsed().as_secs_f64(),
            completion.usage.total_tokens
        );
        let json = serde_json::to_value(&value)
            .map_err(|e| LlmError::MalformedOutput(e.to_string()))?;
        let outcome = AgentOutcome::Structured(json);
        state.add_usage(&completion.usage);
        state.set_outcome(outcome.clone());
        state.record_partial(step, outcome);
        Ok(value)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::AppConfig;
    use crate::memory::{RetrievalError, Snippet};
    use async_trait::async_trait;
    use std::time::Duration;

    /// 固定返回若干片段的检索器
    pub struct FixedRetriever(pub Vec<&'static str>);

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn nearest(&self, _query: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError> {
            Ok(self
                .0
                .iter()
                .take(k)
                .map(|t| Snippet {
                    text: t.to_string(),
                    source_id: "test".to_string(),
                    score: 1.0,
                })
                .collect())
        }
    }

    pub fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::ZERO,
            timeout: Duration::from_millis(100),
        }
    }

    pub fn context(llm: Arc<dyn LlmClient>, snippets: Vec<&'static str>) -> StepContext {
        StepContext {
            llm,
            retriever: Arc::new(FixedRetriever(snippets)),
            prompts: PromptTemplates::default(),
            retry: fast_retry(),
            settings: AgentSettings::from(&AppConfig::default()),
        }
    }
}
