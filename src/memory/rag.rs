//! RAG 知识库：文档分块、向量化、索引持久化与相似度检索
//!
//! `build_index` 由 CLI 的 build-index 子命令离线调用，产出 `{index_dir}/index.json`；
//! 运行期的知识检索工具只读取该文件，不做增量索引。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::EmbeddingProvider;

/// 索引文件名
pub const INDEX_FILE: &str = "index.json";

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Document source not found at {0}")]
    MissingDocument(PathBuf),

    #[error("Vector store not found at {0}. Run 'study-companion build-index' first.")]
    MissingIndex(PathBuf),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// 文档块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
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
            chunk_size: 600,
            chunk_overlap: 50,
            separators: vec!["\n\n".to_string(), "\n".to_string(), " ".to_string()],
        }
    }
}

impl ChunkingConfig {
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
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

    /// 将文档分割为块（UTF-8 安全）：在目标长度内优先于高优先级分隔符处断开，相邻块保留 overlap 字符重叠
    pub fn chunk(&self, doc_id: &str, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        if total_chars == 0 {
            return chunks;
        }

        let mut current_idx = 0;
        let mut chunk_idx = 0;

        while current_idx < total_chars {
            let target_end = (current_idx + self.config.chunk_size).min(total_chars);
            let mut actual_end = target_end;

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

            if actual_end >= total_chars {
                break;
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

/// 检索结果
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// 余弦相似度
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    embedding: Vec<f32>,
}

/// 预构建向量索引（整体序列化为 JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    embedding_model: String,
    created_at: String,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
            entries: Vec::new(),
        }
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn push(&mut self, chunk: Chunk, embedding: Vec<f32>) {
        self.entries.push(IndexEntry { chunk, embedding });
    }

    /// 按余弦相似度返回前 k 个块（降序）
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<RetrievalResult> {
        if query_embedding.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(f32, &Chunk)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), &e.chunk))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| RetrievalResult {
                chunk: chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    /// 写入 `{dir}/index.json`，目录不存在时创建
    pub async fn save(&self, dir: &Path) -> Result<PathBuf, IndexError> {
        tokio::fs::create_dir_all(dir).await?;
        let path = Self::path_in(dir);
        let json = serde_json::to_vec(self)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn load(dir: &Path) -> Result<Self, IndexError> {
        let path = Self::path_in(dir);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(IndexError::MissingIndex(dir.to_path_buf()));
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
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

/// 读取文档 → 分块 → 批量嵌入 → 写入索引目录；返回块数
pub async fn build_index(
    doc_path: &Path,
    index_dir: &Path,
    chunking: ChunkingConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<usize, IndexError> {
    if !tokio::fs::try_exists(doc_path).await.unwrap_or(false) {
        return Err(IndexError::MissingDocument(doc_path.to_path_buf()));
    }
    let text = tokio::fs::read_to_string(doc_path).await?;
    let doc_id = doc_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let chunks = Chunker::new(chunking).chunk(doc_id, &text);
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .await
        .map_err(IndexError::Embedding)?;
    if embeddings.len() != chunks.len() {
        return Err(IndexError::Embedding(format!(
            "expected {} embeddings, got {}",
            chunks.len(),
            embeddings.len()
        )));
    }

    let mut index = VectorIndex::new(embedder.model());
    for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
        index.push(chunk, embedding);
    }
    let count = index.len();
    let path = index.save(index_dir).await?;
    tracing::info!(chunks = count, path = %path.display(), "vector store saved");
    Ok(count)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 确定性嵌入：按关键词出现次数构造向量，便于断言检索顺序
    pub(crate) struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["python", "derivative", "photosynthesis", "atom"];

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model(&self) -> &str {
            "keyword-test"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
            let lower = text.to_lowercase();
            Ok(KEYWORDS
                .iter()
                .map(|k| lower.matches(k).count() as f32)
                .collect())
        }
    }

    #[test]
    fn test_chunking_respects_size_and_source() {
        let chunker = Chunker::new(ChunkingConfig::with_sizes(40, 10));
        let text = "Python lists are ordered.\n\nDictionaries map keys to values.\nSets hold unique items and support fast membership tests.";
        let chunks = chunker.chunk("doc1", text);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            assert!(chunk.text.chars().count() <= 40);
            assert_eq!(chunk.source_id, "doc1");
        }
        assert_eq!(chunks[0].id, "doc1_0");
        assert_eq!(chunks[0].offset, 0);
    }

    #[test]
    fn test_chunking_prefers_paragraph_break() {
        let chunker = Chunker::new(ChunkingConfig::with_sizes(30, 0));
        let chunks = chunker.chunk("d", "First paragraph.\n\nSecond paragraph here.");
        assert_eq!(chunks[0].text, "First paragraph.");
    }

    #[test]
    fn test_chunking_empty_text() {
        assert!(Chunker::default().chunk("d", "").is_empty());
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_build_save_load_search() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("notes.txt");
        std::fs::write(
            &doc,
            "Python is a programming language.\n\nA derivative measures change.\n\nPhotosynthesis converts light to energy.",
        )
        .unwrap();
        let index_dir = dir.path().join("vectorstore");

        let count = build_index(&doc, &index_dir, ChunkingConfig::with_sizes(50, 0), &KeywordEmbedder)
            .await
            .unwrap();
        assert_eq!(count, 3);

        let index = VectorIndex::load(&index_dir).await.unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.embedding_model(), "keyword-test");

        let query = KeywordEmbedder.embed("what is a derivative").await.unwrap();
        let hits = index.search(&query, 2);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].chunk.text.contains("derivative"));
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_build_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_index(
            &dir.path().join("nope.txt"),
            dir.path(),
            ChunkingConfig::default(),
            &KeywordEmbedder,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IndexError::MissingDocument(_)));
    }

    #[tokio::test]
    async fn test_load_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let err = VectorIndex::load(&dir.path().join("absent")).await.unwrap_err();
        assert!(err.to_string().contains("build-index"));
    }
}
