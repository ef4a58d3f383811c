//! 执行器构建器
//!
//! 把显式的模型设置、LLM 客户端、检索器、模板与重试策略装配成 TurnExecutor

use std::sync::Arc;

use crate::config::AgentSettings;
use crate::core::AgentError;
use crate::llm::{LlmClient, RetryPolicy};
use crate::memory::Retriever;
use crate::prompts::PromptTemplates;
use crate::workflow::engine::TurnExecutor;
use crate::workflow::steps::StepContext;

/// 执行器构建器
pub struct TurnExecutorBuilder {
    settings: AgentSettings,
    llm: Option<Arc<dyn LlmClient>>,
    retriever: Option<Arc<dyn Retriever>>,
    prompts: Option<PromptTemplates>,
    retry: RetryPolicy,
}

impl TurnExecutorBuilder {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            llm: None,
            retriever: None,
            prompts: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// 不设置时从 settings.template_source 加载
    pub fn prompts(mut self, prompts: PromptTemplates) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn build(self) -> Result<TurnExecutor, AgentError> {
        let llm = self
            .llm
            .ok_or_else(|| AgentError::ConfigError("LLM client is required".to_string()))?;
        let retriever = self
            .retriever
            .ok_or_else(|| AgentError::ConfigError("retriever is required".to_string()))?;
        let prompts = match self.prompts {
            Some(p) => p,
            None => PromptTemplates::load(&self.settings.template_source)?,
        };

        Ok(TurnExecutor::new(StepContext {
            llm,
            retriever,
            prompts,
            retry: self.retry,
            settings: self.settings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::ScriptedLlmClient;
    use crate::workflow::steps::testing::FixedRetriever;

    fn settings() -> AgentSettings {
        AgentSettings::from(&AppConfig::default())
    }

    #[test]
    fn test_build_without_llm_fails() {
        let result = TurnExecutorBuilder::new(settings())
            .retriever(Arc::new(FixedRetriever(vec!["doc"])))
            .build();
        assert!(matches!(result, Err(AgentError::ConfigError(_))));
    }

    #[test]
    fn test_build_without_retriever_fails() {
        let result = TurnExecutorBuilder::new(settings())
            .llm(Arc::new(ScriptedLlmClient::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_build_loads_templates_from_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"get_name": "{input}"}"#).unwrap();
        let mut s = settings();
        s.template_source = path;

        let result = TurnExecutorBuilder::new(s)
            .llm(Arc::new(ScriptedLlmClient::new()))
            .retriever(Arc::new(FixedRetriever(vec!["doc"])))
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_rejects_broken_template_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, "not json").unwrap();
        let mut s = settings();
        s.template_source = path;

        let result = TurnExecutorBuilder::new(s)
            .llm(Arc::new(ScriptedLlmClient::new()))
            .retriever(Arc::new(FixedRetriever(vec!["doc"])))
            .build();
        assert!(matches!(result, Err(AgentError::Prompt(_))));
    }
}
