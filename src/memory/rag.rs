//! RAG：文档分块、向量索引（JSON 持久化）与检索网关
//!
//! 索引离线构建（charla-ingest 或服务首次启动），对话中只做最近邻查询。
//! Retrieve 步骤只依赖 Retriever trait。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::llm::EmbeddingProvider;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Vector index is empty")]
    EmptyIndex,

    #[error("Index IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 文档块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// 块 ID
    pub id: String,
    /// 原始文本
    pub text: String,
    /// 来源文档 ID
    pub source_id: String,
    /// 在原文档中的位置（字节偏移）
    pub offset: usize,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source_id: source_id.into(),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 0,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                "? ".to_string(),
                "! ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

impl ChunkingConfig {
    /// 按段落对齐：块大小取最长段落字符数 + 1，无重叠
    pub fn paragraph_aligned(text: &str) -> Self {
        let longest = text
            .split("\n\n")
            .map(|p| p.trim().chars().count())
            .max()
            .unwrap_or(0);
        Self {
            chunk_size: longest + 1,
            chunk_overlap: 0,
            ..Default::default()
        }
    }
}

/// 文档分块器
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// 将文档分割为块（UTF-8 安全）
    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let chunk_size = self.config.chunk_size.max(1);

        if total_chars == 0 {
            return chunks;
        }

        let mut current_idx = 0;
        let mut chunk_idx = 0;

        while current_idx < total_chars {
            let target_end = (current_idx + chunk_size).min(total_chars);
            let mut actual_end = target_end;

            // 未到文末时尽量在分隔符处断开
            if target_end < total_chars {
                let slice: String = chars[current_idx..target_end].iter().collect();
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let chars_to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if chars_to_sep > 0 {
                            actual_end = current_idx + chars_to_sep;
                            break;
                        }
                    }
                }
            }

            if actual_end <= current_idx {
                actual_end = (current_idx + 1).min(total_chars);
            }

            let chunk_text: String = chars[current_idx..actual_end].iter().collect();
            let trimmed = chunk_text.trim();

            if !trimmed.is_empty() {
                let byte_offset: usize = chars[..current_idx].iter().map(|c| c.len_utf8()).sum();
                chunks.push(
                    Chunk::new(format!("{}_{}", doc_id, chunk_idx), trimmed, doc_id)
                        .with_offset(byte_offset),
                );
                chunk_idx += 1;
            }

            let overlap = self.config.chunk_overlap.min(actual_end - current_idx);
            let next_start = actual_end.saturating_sub(overlap);
            current_idx = if next_start > current_idx {
                next_start
            } else {
                actual_end
            };
        }

        chunks
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkingConfig::default())
    }
}

/// 索引条目：块 + 向量
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// 向量索引，整体序列化为一个 JSON 文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    /// 构建索引时使用的嵌入模型
    pub model: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, chunk: Chunk, embedding: Vec<f32>) {
        self.entries.push(IndexEntry { chunk, embedding });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RetrievalError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// 按余弦相似度取前 k 个
    pub fn nearest_by_vector(&self, query: &[f32], k: usize) -> Vec<(f32, &Chunk)> {
        let mut scored: Vec<(f32, &Chunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.embedding), &e.chunk))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// 检索结果
#[derive(Debug, Clone, PartialEq)]
pub struct Snippet {
    pub text: String,
    pub source_id: String,
    pub score: f32,
}

/// 向量检索网关
#[async_trait]
pub trait Retriever: Send + Sync {
    /// 最相近的 k 个片段，按相似度降序
    async fn nearest(&self, query: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError>;
}

/// 基于内存向量索引 + 嵌入 API 的检索器
pub struct EmbeddingRetriever {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl EmbeddingRetriever {
    /// 空索引视为配置错误
    pub fn new(index: VectorIndex, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, RetrievalError> {
        if index.is_empty() {
            return Err(RetrievalError::EmptyIndex);
        }
        Ok(Self { index, embedder })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    async fn nearest(&self, query: &str, k: usize) -> Result<Vec<Snippet>, RetrievalError> {
        let started = std::time::Instant::now();
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(RetrievalError::Embedding)?;
        if query_embedding.is_empty() {
            return Err(RetrievalError::Embedding("empty query embedding".to_string()));
        }

        let snippets: Vec<Snippet> = self
            .index
            .nearest_by_vector(&query_embedding, k)
            .into_iter()
            .map(|(score, chunk)| Snippet {
                text: chunk.text.clone(),
                source_id: chunk.source_id.clone(),
                score,
            })
            .collect();
        tracing::debug!(
            "Retrieved {} snippet(s) in {:.2}s",
            snippets.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(snippets)
    }
}

/// 递归读取目录下的 .txt / .md 文档，返回 (文档 ID, 内容)，按路径排序
pub fn load_documents(dir: impl AsRef<Path>) -> Result<Vec<(String, String)>, RetrievalError> {
    let root = dir.as_ref();
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            matches!(
                p.extension().and_then(|ext| ext.to_str()),
                Some("txt") | Some("md")
            )
        })
        .collect();
    paths.sort();

    let mut docs = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        let id = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();
        docs.push((id, text));
    }
    Ok(docs)
}

/// 分块并并发嵌入所有文档，生成新索引
pub async fn build_index(
    docs: &[(String, String)],
    embedder: Arc<dyn EmbeddingProvider>,
    model: &str,
    concurrency: usize,
) -> Result<VectorIndex, RetrievalError> {
    let chunks: Vec<Chunk> = docs
        .iter()
        .flat_map(|(id, text)| Chunker::new(ChunkingConfig::paragraph_aligned(text)).chunk(id, text))
        .collect();
    tracing::info!("Embedding {} chunk(s) from {} document(s)", chunks.len(), docs.len());

    let embedded: Vec<Result<(Chunk, Vec<f32>), RetrievalError>> = stream::iter(chunks)
        .map(|chunk| {
            let embedder = Arc::clone(&embedder);
            async move {
                let v = embedder
                    .embed(&chunk.text)
                    .await
                    .map_err(RetrievalError::Embedding)?;
                Ok::<_, RetrievalError>((chunk, v))
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut index = VectorIndex::new(model);
    for item in embedded {
        let (chunk, v) = item?;
        if v.is_empty() {
            tracing::warn!("Skipping chunk '{}' with empty embedding", chunk.id);
            continue;
        }
        index.push(chunk, v);
    }
    Ok(index)
}

/// 读取目录、构建索引并写入 index_path，返回索引
pub async fn index_directory(
    documents_dir: impl AsRef<Path>,
    index_path: impl AsRef<Path>,
    embedder: Arc<dyn EmbeddingProvider>,
    model: &str,
    concurrency: usize,
) -> Result<VectorIndex, RetrievalError> {
    let docs = load_documents(documents_dir.as_ref())?;
    let index = build_index(&docs, embedder, model, concurrency).await?;
    if index.is_empty() {
        return Err(RetrievalError::EmptyIndex);
    }
    index.save(index_path.as_ref())?;
    tracing::info!(
        "Indexed {} chunk(s) from {} into {}",
        index.len(),
        documents_dir.as_ref().display(),
        index_path.as_ref().display()
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockEmbedder;
    use tempfile::TempDir;

    const POLICY: &str = "La póliza cubre incendios y robos en el hogar.\n\nEl seguro de auto cubre choques y grúa las 24 horas.\n\nLa asistencia médica incluye consultas a domicilio.";

    #[test]
    fn test_paragraph_aligned_chunks_keep_paragraphs_whole() {
        let chunker = Chunker::new(ChunkingConfig::paragraph_aligned(POLICY));
        let chunks = chunker.chunk("poliza", POLICY);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "La póliza cubre incendios y robos en el hogar.");
        assert_eq!(chunks[2].id, "poliza_2");
        for chunk in &chunks {
            assert_eq!(chunk.source_id, "poliza");
        }
    }

    #[test]
    fn test_chunking_empty_text() {
        assert!(Chunker::default().chunk("vacio", "").is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c)).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_save_load_and_query() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder::default());
        let docs = vec![("poliza.md".to_string(), POLICY.to_string())];
        let index = build_index(&docs, Arc::clone(&embedder), "mock", 2).await.unwrap();
        assert_eq!(index.len(), 3);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("index.json");
        index.save(&path).unwrap();
        let loaded = VectorIndex::load(&path).unwrap();
        assert_eq!(loaded.model, "mock");

        let retriever = EmbeddingRetriever::new(loaded, embedder).unwrap();
        let hits = retriever.nearest("¿El seguro de auto incluye grúa?", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("grúa"));
    }

    #[test]
    fn test_empty_index_is_rejected() {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder::default());
        let err = EmbeddingRetriever::new(VectorIndex::new("mock"), embedder).err();
        assert!(matches!(err, Some(RetrievalError::EmptyIndex)));
    }

    #[tokio::test]
    async fn test_index_directory_writes_file() {
        let docs = TempDir::new().unwrap();
        std::fs::write(docs.path().join("poliza.md"), POLICY).unwrap();
        let out = TempDir::new().unwrap();
        let index_path = out.path().join("index.json");

        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder::default());
        let index = index_directory(docs.path(), &index_path, embedder, "mock", 4)
            .await
            .unwrap();

        assert_eq!(index.len(), 3);
        assert!(index_path.exists());
    }

    #[tokio::test]
    async fn test_index_directory_rejects_empty_corpus() {
        let docs = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbedder::default());
        let err = index_directory(docs.path(), out.path().join("i.json"), embedder, "mock", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmptyIndex));
    }

    #[test]
    fn test_load_documents_filters_extensions() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "uno").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), "dos").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "tres").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].0, "a.md");
        assert_eq!(docs[1].1, "dos");
    }
}
