//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、重试、结构化输出

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod schema;
pub mod traits;

pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use mock::{MockEmbedder, ScriptedLlmClient};
pub use openai::OpenAiClient;
pub use retry::RetryPolicy;
pub use schema::{format_instructions, parse_structured};
pub use traits::{Completion, LlmClient, LlmError, TokenUsage};
