//! Charla - Rust 对话式智能体后端
//!
//! 模块划分：
//! - **agent**: 单轮对话运行时（历史重建 → 对话图 → 持久化）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、重试、结构化输出
//! - **memory**: 对话消息、历史重建、向量检索、SQLite 持久化
//! - **observability**: 日志初始化
//! - **prompts**: 提示模板与固定回复文本
//! - **web**: axum HTTP 接口
//! - **workflow**: 对话状态、固定拓扑与路由、步骤函数、执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompts;
pub mod web;
pub mod workflow;

pub use agent::{ChatAgent, ChatRequest, ChatResponse};
