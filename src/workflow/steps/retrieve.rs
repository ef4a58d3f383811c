//! Retrieve：取最相近的文档片段并生成初稿

use crate::core::AgentError;
use crate::memory::render_history;
use crate::prompts::names;
use crate::workflow::state::TurnState;
use crate::workflow::steps::StepContext;
use crate::workflow::types::StepId;

pub async fn retrieve(ctx: &StepContext, state: &mut TurnState) -> Result<(), AgentError> {
    // 用原始输入检索，不用译文
    let input = state.raw_input().to_string();
    let snippet = ctx
        .retriever
        .nearest(&input, 1)
        .await?
        .into_iter()
        .next()
        .ok_or(AgentError::NoContext)?;
    tracing::debug!(
        "Best snippet from '{}' (score {:.3})",
        snippet.source_id,
        snippet.score
    );
    state.set_retrieved_context(snippet.text);

    let context = state.retrieved_context().unwrap_or_default().to_string();
    let translated = state.translated_input().unwrap_or(&input).to_string();
    let history = render_history(state.chat_history());
    let user_name = state.user_name().unwrap_or_default().to_string();
    let language = state.language().unwrap_or_default().to_string();

    ctx.invoke(
        StepId::Retrieve,
        names::CALL_RAG,
        &[
            ("context", context.as_str()),
            ("chat_history", history.as_str()),
            ("input", input.as_str()),
            ("translated_input", translated.as_str()),
            ("user_name", user_name.as_str()),
            ("language", language.as_str()),
        ],
        state,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::workflow::steps::testing;
    use crate::workflow::types::AgentOutcome;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_draft_uses_best_snippet() {
        let llm = Arc::new(ScriptedLlmClient::new().reply("La póliza cubre incendios."));
        let ctx = testing::context(llm.clone(), vec!["Cobertura: incendios y robos.", "Otro"]);
        let mut state = TurnState::new("¿Qué cubre?", Some("Maria".into()), Some("español".into()), Vec::new());
        state.set_translated_input("¿Qué cubre?");

        retrieve(&ctx, &mut state).await.unwrap();

        assert_eq!(state.retrieved_context(), Some("Cobertura: incendios y robos."));
        let expected = AgentOutcome::text("La póliza cubre incendios.");
        assert_eq!(state.agent_outcome(), &expected);
        assert_eq!(state.partial_states().get(StepId::Retrieve), Some(&expected));
        assert!(llm.requests()[0][0].content.contains("Cobertura: incendios y robos."));
    }

    #[tokio::test]
    async fn test_no_snippet_is_an_error() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let ctx = testing::context(llm.clone(), vec![]);
        let mut state = TurnState::new("¿Qué cubre?", Some("Maria".into()), Some("español".into()), Vec::new());

        let err = retrieve(&ctx, &mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::NoContext));
        assert_eq!(llm.calls(), 0);
    }
}
