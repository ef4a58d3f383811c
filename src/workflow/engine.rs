//! 对话执行器
//!
//! 从入口步骤开始，逐个执行并询问路由器；任一步骤失败时以致歉文本作为最终输出，不向调用方传播错误。

use std::time::Instant;

use crate::core::AgentError;
use crate::prompts::APOLOGY_MESSAGE;
use crate::workflow::graph::{self, ENTRY};
use crate::workflow::state::TurnState;
use crate::workflow::steps::{self, StepContext};
use crate::workflow::types::{AgentOutcome, Route, StepId};

/// 一轮执行的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: TurnState,
    /// 实际执行过的步骤（按顺序）
    pub trace: Vec<StepId>,
    /// 导致走致歉分支的错误描述
    pub failure: Option<String>,
}

impl TurnOutcome {
    pub fn reply(&self) -> String {
        self.state.agent_outcome().reply_text()
    }
}

/// 对话执行器
pub struct TurnExecutor {
    ctx: StepContext,
}

impl TurnExecutor {
    pub fn new(ctx: StepContext) -> Self {
        Self { ctx }
    }

    async fn run_step(&self, step: StepId, state: &mut TurnState) -> Result<(), AgentError> {
        match step {
            StepId::RequestName => steps::request_name(&self.ctx, state).await,
            StepId::RequestLanguage => steps::request_language(&self.ctx, state).await,
            StepId::Retrieve => steps::retrieve(&self.ctx, state).await,
            StepId::Compose => steps::compose(&self.ctx, state).await,
        }
    }

    /// 执行一轮
    pub async fn run(&self, mut state: TurnState) -> TurnOutcome {
        let started = Instant::now();
        let mut trace = Vec::new();
        let mut current = ENTRY;

        loop {
            tracing::debug!("Entering step '{}'", current);
            trace.push(current);

            if let Err(e) = self.run_step(current, &mut state).await {
                tracing::error!("Step '{}' failed, replying with apology: {}", current, e);
                state.set_outcome(AgentOutcome::text(APOLOGY_MESSAGE));
                return TurnOutcome {
                    state,
                    trace,
                    failure: Some(e.to_string()),
                };
            }
            tracing::debug!("Step '{}' outcome: {:?}", current, state.agent_outcome());

            match graph::route(current, &state) {
                Route::Continue(next) => current = next,
                Route::Terminate => break,
            }
        }

        tracing::info!(
            "Turn finished after {:?} in {:.2}s, {} tokens",
            trace,
            started.elapsed().as_secs_f64(),
            state.tokens_used().total_tokens
        );
        TurnOutcome {
            state,
            trace,
            failure: None,
        }
    }
}
