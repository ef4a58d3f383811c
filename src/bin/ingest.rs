//! Charla 文档导入
//!
//! 将文档目录（.txt / .md）分块、嵌入并写入向量索引文件。
//! 用法：charla-ingest [文档目录] [索引文件]，缺省时使用 rag.documents_dir / rag.index_path

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use charla::config::{load_config, AgentSettings};
use charla::llm::{EmbeddingProvider, OpenAiEmbedder};
use charla::memory::rag::index_directory;

const CONCURRENCY: usize = 8;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config(None).context("Failed to load config")?;
    charla::observability::init(&cfg.app.log_level);

    let mut args = std::env::args().skip(1);
    let documents_dir = args
        .next()
        .map(PathBuf::from)
        .or_else(|| cfg.rag.documents_dir.clone())
        .context("No documents directory given and rag.documents_dir is not set")?;
    let index_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| cfg.rag.index_path.clone());

    let settings = AgentSettings::from(&cfg);
    let api_key = cfg
        .llm
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAiEmbedder::new(
        cfg.llm.base_url.as_deref(),
        &api_key,
        &settings.embedding_model,
        cfg.embedding.dimensions,
    ));

    let started = std::time::Instant::now();
    let index = index_directory(&documents_dir, &index_path, embedder, &settings.embedding_model, CONCURRENCY)
        .await
        .with_context(|| format!("Failed to index {}", documents_dir.display()))?;

    println!(
        "Indexed {} chunk(s) into {} in {:.1}s",
        index.len(),
        index_path.display(),
        started.elapsed().as_secs_f64()
    );
    Ok(())
}
