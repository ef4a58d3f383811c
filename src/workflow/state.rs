//! 一轮对话的状态
//!
//! 每个请求新建，按步骤逐步修改，结束后只持久化其投影（回复、用户名、语言、用量、partial state）。
//! 字段私有，写入只能通过保持不变量的方法完成。

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::llm::TokenUsage;
use crate::memory::{Message, PriorKnowledge};
use crate::workflow::types::{AgentOutcome, NameResolution, StepId};

/// 本轮执行过的步骤及其输出，按首次写入顺序排列；同一步骤再次写入时原位替换
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialStateLog {
    entries: Vec<(StepId, AgentOutcome)>,
}

impl PartialStateLog {
    pub fn record(&mut self, step: StepId, outcome: AgentOutcome) {
        match self.entries.iter_mut().find(|(s, _)| *s == step) {
            Some(entry) => entry.1 = outcome,
            None => self.entries.push((step, outcome)),
        }
    }

    pub fn get(&self, step: StepId) -> Option<&AgentOutcome> {
        self.entries.iter().find(|(s, _)| *s == step).map(|(_, o)| o)
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.get(step).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn steps(&self) -> impl Iterator<Item = StepId> + '_ {
        self.entries.iter().map(|(s, _)| *s)
    }

    /// 转为 JSON 对象（键为步骤键，保持顺序）
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::Value::Object(Default::default()))
    }
}

impl Serialize for PartialStateLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (step, outcome) in &self.entries {
            map.serialize_entry(step.key(), outcome)?;
        }
        map.end()
    }
}

/// 一轮对话状态
#[derive(Debug, Clone, PartialEq)]
pub struct TurnState {
    raw_input: String,
    translated_input: Option<String>,
    user_name: Option<String>,
    name_resolution: NameResolution,
    language: Option<String>,
    chat_history: Vec<Message>,
    retrieved_context: Option<String>,
    agent_outcome: AgentOutcome,
    partial_states: PartialStateLog,
    tokens_used: TokenUsage,
}

impl TurnState {
    pub fn new(
        raw_input: impl Into<String>,
        user_name: Option<String>,
        language: Option<String>,
        chat_history: Vec<Message>,
    ) -> Self {
        let user_name = user_name.filter(|n| !n.trim().is_empty());
        let language = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty());
        let name_resolution = if user_name.is_some() {
            NameResolution::Prior
        } else {
            NameResolution::Unresolved
        };
        Self {
            raw_input: raw_input.into(),
            translated_input: None,
            user_name,
            name_resolution,
            language,
            chat_history,
            retrieved_context: None,
            agent_outcome: AgentOutcome::Empty,
            partial_states: PartialStateLog::default(),
            tokens_used: TokenUsage::default(),
        }
    }

    pub fn from_prior(raw_input: impl Into<String>, prior: &PriorKnowledge) -> Self {
        Self::new(
            raw_input,
            prior.user_name.clone(),
            prior.language.clone(),
            prior.chat_history.clone(),
        )
    }

    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn translated_input(&self) -> Option<&str> {
        self.translated_input.as_deref()
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }

    pub fn name_resolution(&self) -> NameResolution {
        self.name_resolution
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn chat_history(&self) -> &[Message] {
        &self.chat_history
    }

    pub fn retrieved_context(&self) -> Option<&str> {
        self.retrieved_context.as_deref()
    }

    pub fn agent_outcome(&self) -> &AgentOutcome {
        &self.agent_outcome
    }

    pub fn partial_states(&self) -> &PartialStateLog {
        &self.partial_states
    }

    pub fn tokens_used(&self) -> TokenUsage {
        self.tokens_used
    }

    /// 设置用户名：已有非空名字或传入为空时不生效，返回是否写入
    pub fn resolve_user_name(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.user_name.is_some() || name.trim().is_empty() {
            return false;
        }
        self.user_name = Some(name.trim().to_string());
        self.name_resolution = NameResolution::ThisTurn;
        true
    }

    /// 设置语言（小写）：已知时不覆盖
    pub fn resolve_language(&mut self, language: &str) -> bool {
        let language = language.trim().to_lowercase();
        if self.language.is_some() || language.is_empty() {
            return false;
        }
        self.language = Some(language);
        true
    }

    /// 设置翻译后的输入：每轮只写一次
    pub fn set_translated_input(&mut self, translated: impl Into<String>) -> bool {
        if self.translated_input.is_some() {
            return false;
        }
        self.translated_input = Some(translated.into());
        true
    }

    pub fn set_retrieved_context(&mut self, context: impl Into<String>) {
        self.retrieved_context = Some(context.into());
    }

    pub fn set_outcome(&mut self, outcome: AgentOutcome) {
        self.agent_outcome = outcome;
    }

    pub fn record_partial(&mut self, step: StepId, outcome: AgentOutcome) {
        self.partial_states.record(step, outcome);
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.tokens_used.add(usage);
    }
}
