//! Compose：按目标语言与人设改写初稿

use crate::core::AgentError;
use crate::prompts::{names, PIVOT_LANGUAGE};
use crate::workflow::state::TurnState;
use crate::workflow::steps::StepContext;
use crate::workflow::types::StepId;

/// 以 Retrieve 的草稿与检索片段为依据生成最终回复
pub async fn compose(ctx: &StepContext, state: &mut TurnState) -> Result<(), AgentError> {
    let language = state.language().unwrap_or(PIVOT_LANGUAGE).to_string();
    let template = if language == PIVOT_LANGUAGE {
        names::PERSONALITY_ESP
    } else {
        names::PERSONALITY
    };
    tracing::debug!("Composing reply in '{}' with template {}", language, template);

    let draft = state.agent_outcome().reply_text();
    let user_name = state.user_name().unwrap_or_default().to_string();
    let input = state.raw_input().to_string();
    let context = state.retrieved_context().unwrap_or_default().to_string();

    ctx.invoke(
        StepId::Compose,
        template,
        &[
            ("draft", draft.as_str()),
            ("user_name", user_name.as_str()),
            ("language", language.as_str()),
            ("input", input.as_str()),
            ("context", context.as_str()),
        ],
        state,
    )
    .await?;
    Ok(())
}
