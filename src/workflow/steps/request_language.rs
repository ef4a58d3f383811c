//! RequestLanguage：识别语言并把输入翻译成中枢语言
//!
//! 依次判断四种情况：
//! 1. 语言未知、名字不是本轮识别的：检测语言 + 翻译
//! 2. 语言未知、名字是本轮刚识别的：不调用模型，直接问候
//! 3. 语言已知、本轮输入未翻译：检测 + 翻译，只补 translated_input，不覆盖已知语言
//! 4. 语言已知且已翻译：无操作

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::prompts::{greeting, names, LANGUAGE_REPROMPT};
use crate::workflow::state::TurnState;
use crate::workflow::steps::StepContext;
use crate::workflow::types::{AgentOutcome, NameResolution, StepId};

/// 语言检测 + 翻译结果
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LanguageDetection {
    /// 用户消息所用语言的西班牙语名称，小写；无法判断时为空字符串
    #[serde(default)]
    pub language: String,
    /// 用户消息的西班牙语译文
    #[serde(default)]
    pub translate: String,
}

pub async fn request_language(ctx: &StepContext, state: &mut TurnState) -> Result<(), AgentError> {
    let language_known = state.language().is_some();

    if !language_known && state.name_resolution() == NameResolution::ThisTurn {
        let name = state.user_name().unwrap_or_default().to_string();
        let text = greeting(&name);
        tracing::debug!("Name resolved this turn, greeting {} without model call", name);
        state.set_outcome(AgentOutcome::text(text.clone()));
        state.record_partial(StepId::RequestLanguage, AgentOutcome::text(text));
        return Ok(());
    }

    if language_known && state.translated_input().is_some() {
        tracing::debug!("Language and translation already present, skipping");
        return Ok(());
    }

    let input = state.raw_input().to_string();
    let detection: LanguageDetection = ctx
        .invoke_structured(
            StepId::RequestLanguage,
            names::GET_LANGUAGE,
            &[("input", input.as_str())],
            state,
        )
        .await?;

    let language = detection.language.trim().to_lowercase();
    if language.is_empty() {
        tracing::debug!("Language detection came back empty");
        state.set_outcome(AgentOutcome::text(LANGUAGE_REPROMPT));
        return Ok(());
    }

    state.set_translated_input(detection.translate.trim());
    if language_known {
        if state.language() != Some(language.as_str()) {
            tracing::debug!(
                "Detected '{}' but keeping known language {:?}",
                language,
                state.language()
            );
        }
    } else {
        tracing::debug!("Resolved language: {}", language);
        state.resolve_language(&language);
    }
    Ok(())
}
