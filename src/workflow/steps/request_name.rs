//! RequestName：识别用户名

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::render_history;
use crate::prompts::{names, NAME_REPROMPT};
use crate::workflow::state::TurnState;
use crate::workflow::steps::StepContext;
use crate::workflow::types::{AgentOutcome, StepId};

/// 名字抽取结果
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NameExtraction {
    /// 用户的名字；用户没有提到名字时为空字符串
    #[serde(default)]
    pub user_name: String,
}

/// 每个词首字母大写、其余小写
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn request_name(ctx: &StepContext, state: &mut TurnState) -> Result<(), AgentError> {
    if let Some(name) = state.user_name() {
        tracing::debug!("User name already known ({}), skipping extraction", name);
        return Ok(());
    }

    let input = state.raw_input().to_string();
    let history = render_history(state.chat_history());
    let extraction: NameExtraction = ctx
        .invoke_structured(
            StepId::RequestName,
            names::GET_NAME,
            &[("input", input.as_str()), ("chat_history", history.as_str())],
            state,
        )
        .await?;

    let name = title_case(&extraction.user_name);
    if name.is_empty() {
        tracing::debug!("No user name found in input");
        state.set_outcome(AgentOutcome::text(NAME_REPROMPT));
    } else {
        tracing::debug!("Resolved user name: {}", name);
        state.resolve_user_name(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::workflow::steps::testing;
    use crate::workflow::types::NameResolution;
    use std::sync::Arc;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("maría JOSÉ"), "María José");
        assert_eq!(title_case("  juan  "), "Juan");
        assert_eq!(title_case(""), "");
    }

    #[tokio::test]
    async fn test_known_name_is_a_no_op() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let ctx = testing::context(llm.clone(), vec![]);
        let mut state = TurnState::new("¿Qué cubre?", Some("Maria".into()), None, Vec::new());
        let before = state.clone();

        request_name(&ctx, &mut state).await.unwrap();

        assert_eq!(state, before);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_extraction_sets_title_cased_name() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(r#"{"user_name": "maria"}"#));
        let ctx = testing::context(llm.clone(), vec![]);
        let mut state = TurnState::new("soy maria", None, None, Vec::new());

        request_name(&ctx, &mut state).await.unwrap();

        assert_eq!(state.user_name(), Some("Maria"));
        assert_eq!(state.name_resolution(), NameResolution::ThisTurn);
        assert!(state.partial_states().contains(StepId::RequestName));
        assert_eq!(state.tokens_used().total_tokens, 15);
        assert!(llm.requests()[0][0].content.contains("soy maria"));
    }

    #[tokio::test]
    async fn test_empty_extraction_reprompts() {
        let llm = Arc::new(ScriptedLlmClient::new().reply(r#"{"user_name": ""}"#));
        let ctx = testing::context(llm, vec![]);
        let mut state = TurnState::new("Hola", None, None, Vec::new());

        request_name(&ctx, &mut state).await.unwrap();

        assert_eq!(state.user_name(), None);
        assert_eq!(state.agent_outcome(), &AgentOutcome::text(NAME_REPROMPT));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_retried() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .reply("No sé")
                .reply(r#"{"user_name": "Juan"}"#),
        );
        let ctx = testing::context(llm.clone(), vec![]);
        let mut state = TurnState::new("me llamo juan", None, None, Vec::new());

        request_name(&ctx, &mut state).await.unwrap();

        assert_eq!(state.user_name(), Some("Juan"));
        assert_eq!(llm.calls(), 2);
    }
}
