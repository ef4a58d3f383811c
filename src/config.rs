//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CHARLA__*` 覆盖（双下划线表示嵌套，如 `CHARLA__LLM__CHAT_MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub storage: StorageSection,
    pub history: HistorySection,
    pub rag: RagSection,
}

/// [app] 段：应用名、日志级别
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// EnvFilter 默认指令，RUST_LOG 存在时以 RUST_LOG 为准
    pub log_level: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_level: "info".to_string(),
        }
    }
}

/// [server] 段：监听地址、API Key、记录到会话上的版本号
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
    /// 未配置时不校验 X-API-Key
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            api_key: None,
            api_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// [llm] 段：对话模型、采样参数、模板来源、重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub chat_model: String,
    pub temperature: f32,
    pub seed: Option<i64>,
    pub base_url: Option<String>,
    /// 为空时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
    pub template_source: PathBuf,
    pub retry: LlmRetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            seed: None,
            base_url: None,
            api_key: None,
            template_source: PathBuf::from("config/prompts.json"),
            retry: LlmRetrySection::default(),
        }
    }
}

/// [llm.retry] 段：尝试次数、固定退避、单次调用超时（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmRetrySection {
    pub max_attempts: u32,
    pub backoff_secs: u64,
    pub timeout_secs: u64,
}

impl Default for LlmRetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff_secs: 2,
            timeout_secs: 30,
        }
    }
}

/// [embedding] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    pub dimensions: Option<u32>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }
}

/// [storage] 段：SQLite 文件路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub database_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/charla.db"),
        }
    }
}

/// 用户画像（名字、语言）从哪条消息继承
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProfileScope {
    /// 整张 messages 表最新一条（历史行为）
    #[default]
    Global,
    /// 仅当前会话最新一条
    Session,
}

/// [history] 段：重建历史时读取的消息条数、画像继承范围
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistorySection {
    pub limit: usize,
    pub profile_scope: ProfileScope,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            limit: 5,
            profile_scope: ProfileScope::Global,
        }
    }
}

/// [rag] 段：向量索引文件与原始文档目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub index_path: PathBuf,
    pub documents_dir: Option<PathBuf>,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("data/index.json"),
            documents_dir: None,
        }
    }
}

/// 显式传入 TurnExecutor 的模型相关设置（不在 import 时读全局环境）
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub chat_model: String,
    pub temperature: f32,
    pub seed: Option<i64>,
    pub template_source: PathBuf,
    pub embedding_model: String,
}

impl From<&AppConfig> for AgentSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            chat_model: cfg.llm.chat_model.clone(),
            temperature: cfg.llm.temperature,
            seed: cfg.llm.seed,
            template_source: cfg.llm.template_source.clone(),
            embedding_model: cfg.embedding.model.clone(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 CHARLA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CHARLA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CHARLA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
