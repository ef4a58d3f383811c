//! 对话图类型定义
//!
//! 步骤标识、路由结果、名字解析阶段、步骤输出

use serde::{Deserialize, Serialize};

/// 固定的四个步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    RequestName,
    RequestLanguage,
    Retrieve,
    Compose,
}

impl StepId {
    /// 在 partial state 日志与持久化记录中使用的键
    pub fn key(&self) -> &'static str {
        match self {
            StepId::RequestName => "request_name",
            StepId::RequestLanguage => "request_language",
            StepId::Retrieve => "rag",
            StepId::Compose => "personality",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// 路由器的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Continue(StepId),
    Terminate,
}

/// 用户名在本轮的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameResolution {
    /// 从历史继承
    Prior,
    /// 本轮由 RequestName 识别
    ThisTurn,
    /// 仍未知
    Unresolved,
}

/// 步骤输出：纯文本或结构化对象
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutcome {
    #[default]
    Empty,
    Text(String),
    Structured(serde_json::Value),
}

impl AgentOutcome {
    pub fn text(s: impl Into<String>) -> Self {
        AgentOutcome::Text(s.into())
    }

    /// 作为最终回复展示给用户的文本
    pub fn reply_text(&self) -> String {
        match self {
            AgentOutcome::Empty => String::new(),
            AgentOutcome::Text(s) => s.clone(),
            AgentOutcome::Structured(v) => v.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AgentOutcome::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_keys() {
        assert_eq!(StepId::RequestName.key(), "request_name");
        assert_eq!(StepId::RequestLanguage.key(), "request_language");
        assert_eq!(StepId::Retrieve.key(), "rag");
        assert_eq!(StepId::Compose.to_string(), "personality");
    }

    #[test]
    fn test_outcome_serializes_untagged() {
        assert_eq!(serde_json::to_value(AgentOutcome::text("hola")).unwrap(), "hola");
        let structured = AgentOutcome::Structured(serde_json::json!({"user_name": "Maria"}));
        assert_eq!(
            serde_json::to_value(&structured).unwrap()["user_name"],
            "Maria"
        );
        assert!(serde_json::to_value(AgentOutcome::Empty).unwrap().is_null());
    }

    #[test]
    fn test_reply_text() {
        assert_eq!(AgentOutcome::Empty.reply_text(), "");
        assert_eq!(AgentOutcome::text("hola").reply_text(), "hola");
    }
}
