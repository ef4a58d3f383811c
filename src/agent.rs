//! 对话 Agent 运行时
//!
//! 供 HTTP 层调用：handle 对单条用户输入依次执行历史重建、对话图、持久化，返回最终回复。

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{ChatStore, HistoryReconstructor, NewMessage};
use crate::workflow::{TurnExecutor, TurnState};

/// 入站请求；session_id 为空表示新会话
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: String,
    pub input: String,
}

/// 出站响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub respuesta: String,
}

/// 对话 Agent：多会话共享，单轮之间不保留任何内存状态
pub struct ChatAgent {
    reconstructor: HistoryReconstructor,
    executor: TurnExecutor,
    store: Arc<dyn ChatStore>,
    api_version: String,
}

impl ChatAgent {
    pub fn new(
        reconstructor: HistoryReconstructor,
        executor: TurnExecutor,
        store: Arc<dyn ChatStore>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            reconstructor,
            executor,
            store,
            api_version: api_version.into(),
        }
    }

    /// 处理一轮对话；只有存储写入失败会返回错误
    pub async fn handle(&self, request: ChatRequest) -> Result<ChatResponse, AgentError> {
        let started = Instant::now();
        let prior = self.reconstructor.reconstruct(&request.session_id).await?;
        let session_id = prior.session_id.clone();

        let state = TurnState::from_prior(request.input, &prior);
        let outcome = self.executor.run(state).await;
        let answer = outcome.reply();
        let state = &outcome.state;

        let message = NewMessage {
            session_id: session_id.clone(),
            user_name: state.user_name().map(str::to_string),
            user_message: state.raw_input().to_string(),
            answer: answer.clone(),
            language: state.language().map(str::to_string),
            tokens_used: state.tokens_used(),
            state: state.partial_states().to_json(),
        };
        self.store.save_message(&message, &self.api_version).await?;

        tracing::info!(
            "Session '{}' turn processed in {:.2}s{}",
            session_id,
            started.elapsed().as_secs_f64(),
            if outcome.failure.is_some() { " (apology)" } else { "" }
        );
        Ok(ChatResponse {
            session_id,
            respuesta: answer,
        })
    }
}
