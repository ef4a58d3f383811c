//! Charla - 对话式智能体 HTTP 服务
//!
//! 入口：加载配置、初始化日志、打开数据库与向量索引、装配执行器，并启动 axum 服务。
//! 用法：charla [config.toml]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use charla::config::{load_config, AgentSettings, AppConfig};
use charla::llm::{EmbeddingProvider, OpenAiClient, OpenAiEmbedder, RetryPolicy};
use charla::memory::rag::index_directory;
use charla::memory::{EmbeddingRetriever, HistoryReconstructor, SqliteChatStore, VectorIndex};
use charla::web::{router, ApiKeyAuth, AppState};
use charla::workflow::TurnExecutorBuilder;
use charla::ChatAgent;

/// 构建索引时的并发嵌入请求数
const INDEX_CONCURRENCY: usize = 4;

/// 读取索引；文件不存在且配置了文档目录时现场构建
async fn load_or_build_index(
    cfg: &AppConfig,
    settings: &AgentSettings,
    embedder: Arc<dyn EmbeddingProvider>,
) -> anyhow::Result<VectorIndex> {
    let index_path = &cfg.rag.index_path;
    if index_path.exists() {
        let index = VectorIndex::load(index_path)
            .with_context(|| format!("Failed to load vector index {}", index_path.display()))?;
        tracing::info!("Loaded vector index {} ({} chunks)", index_path.display(), index.len());
        if index.model != settings.embedding_model {
            tracing::warn!(
                "Vector index was built with '{}' but embedding model is '{}'",
                index.model,
                settings.embedding_model
            );
        }
        return Ok(index);
    }

    let Some(dir) = cfg.rag.documents_dir.as_ref() else {
        bail!(
            "Vector index {} not found and rag.documents_dir is not set",
            index_path.display()
        );
    };
    tracing::info!("Vector index missing, building from {}", dir.display());
    index_directory(dir, index_path, embedder, &settings.embedding_model, INDEX_CONCURRENCY)
        .await
        .with_context(|| format!("Failed to build vector index from {}", dir.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    charla::observability::init(&cfg.app.log_level);

    let api_key = cfg
        .llm
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!("No LLM API key configured (llm.api_key / OPENAI_API_KEY)");
    }
    let base_url = cfg.llm.base_url.as_deref();
    let settings = AgentSettings::from(&cfg);

    let store = Arc::new(
        SqliteChatStore::new(&cfg.storage.database_path)
            .await
            .with_context(|| format!("Failed to open database {}", cfg.storage.database_path.display()))?,
    );

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(
        base_url,
        &api_key,
        &settings.embedding_model,
        cfg.embedding.dimensions,
    ));
    let index = load_or_build_index(&cfg, &settings, Arc::clone(&embedder)).await?;
    let retriever = EmbeddingRetriever::new(index, embedder)
        .context("Vector index is empty, refusing to start")?;

    let llm = Arc::new(OpenAiClient::new(base_url, &api_key, &settings));
    tracing::info!("Using chat model {}", llm.model());
    let executor = TurnExecutorBuilder::new(settings)
        .llm(llm)
        .retriever(Arc::new(retriever))
        .retry(RetryPolicy::from(&cfg.llm.retry))
        .build()
        .context("Failed to build turn executor")?;

    let reconstructor = HistoryReconstructor::new(store.clone(), &cfg.history, cfg.server.api_version.clone());
    let agent = ChatAgent::new(reconstructor, executor, store, cfg.server.api_version.clone());

    let app = router(
        AppState {
            agent: Arc::new(agent),
        },
        ApiKeyAuth {
            api_key: cfg.server.api_key.clone(),
        },
    );

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.server.bind))?;
    tracing::info!("Charla listening on {}", cfg.server.bind);
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
