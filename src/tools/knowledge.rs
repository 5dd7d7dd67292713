//! 知识库检索工具：在预构建的向量索引上做相似度检索
//!
//! 索引在首次调用时懒加载并缓存；索引缺失时返回错误，由执行器转成 observation 交给模型。

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::llm::EmbeddingProvider;
use crate::memory::{RetrievalResult, VectorIndex};
use crate::tools::{query_from_args, Tool};

const NO_RESULTS: &str = "No relevant information found in the educational knowledge base for this query. \
Consider using web search for additional information.";

pub struct KnowledgeSearchTool {
    index_dir: PathBuf,
    top_k: usize,
    embedder: Arc<dyn EmbeddingProvider>,
    index: OnceCell<VectorIndex>,
}

impl KnowledgeSearchTool {
    pub fn new(index_dir: impl Into<PathBuf>, top_k: usize, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index_dir: index_dir.into(),
            top_k: top_k.max(1),
            embedder,
            index: OnceCell::new(),
        }
    }

    async fn index(&self) -> Result<&VectorIndex, String> {
        self.index
            .get_or_try_init(|| async {
                let index = VectorIndex::load(&self.index_dir)
                    .await
                    .map_err(|e| e.to_string())?;
                if index.embedding_model() != self.embedder.model() {
                    tracing::warn!(
                        index_model = %index.embedding_model(),
                        query_model = %self.embedder.model(),
                        "embedding model mismatch; results may be poor"
                    );
                }
                tracing::info!(chunks = index.len(), dir = %self.index_dir.display(), "vector store loaded");
                Ok(index)
            })
            .await
    }

    pub async fn search(&self, query: &str) -> Result<String, String> {
        let index = self.index().await?;
        let embedding = self.embedder.embed(query).await?;
        let hits = index.search(&embedding, self.top_k);
        tracing::debug!(query = %query, hits = hits.len(), "knowledge search");
        Ok(format_results(&hits))
    }
}

/// 将检索结果排版为带编号、以分隔线结尾的资料段落
pub fn format_results(hits: &[RetrievalResult]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    let rule = "─".repeat(60);
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "📚 Educational Resource {}:\n{}\n{}",
                i + 1,
                hit.chunk.text.trim(),
                rule
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn name(&self) -> &str {
        "educational_knowledge_search"
    }

    fn description(&self) -> &str {
        "Search the local educational knowledge base for relevant concepts, definitions and explanations. \
         Use it first for foundational material before searching the web. \
         Args: {\"query\": \"what is a derivative\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_from_args(&args).ok_or_else(|| "Missing query".to_string())?;
        self.search(query).await
    }
}
