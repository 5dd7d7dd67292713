//! 流水线入口：在回退矩阵上逐个尝试，直到某组 LLM 配置跑通全部任务
//!
//! 工具集在运行时构建一次、各次尝试共享；每次尝试按覆盖项新建 LLM 客户端与 Crew。
//! 失败语义只有一种：记录错误，换下一组；全部失败时返回携带最后一个错误的 AllAttemptsFailed。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::config::{AppConfig, IndexSection};
use crate::core::PipelineError;
use crate::llm::{create_llm, EmbeddingProvider, LlmClient, LlmSettings, OpenAiEmbedder};
use crate::memory::{build_index, ChunkingConfig};
use crate::pipeline::{build_llm_attempts, Crew, PipelineEvent, StudyPack};
use crate::tasks::{build_educational_tasks, StudyOptions};
use crate::tools::{default_toolkit, ToolExecutor};

/// 由连接参数创建 LLM 客户端；测试中注入 Mock
pub trait LlmFactory: Send + Sync {
    fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, String>;
}

impl<F> LlmFactory for F
where
    F: Fn(&LlmSettings) -> Result<Arc<dyn LlmClient>, String> + Send + Sync,
{
    fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, String> {
        self(settings)
    }
}

/// 默认工厂：OpenAI 兼容客户端
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiFactory;

impl LlmFactory for OpenAiFactory {
    fn create(&self, settings: &LlmSettings) -> Result<Arc<dyn LlmClient>, String> {
        create_llm(settings)
    }
}

/// 流水线运行时：配置 + 共享工具执行器 + LLM 工厂
pub struct PipelineRuntime {
    cfg: AppConfig,
    executor: Arc<ToolExecutor>,
    factory: Arc<dyn LlmFactory>,
}

impl PipelineRuntime {
    pub fn new(cfg: AppConfig, executor: ToolExecutor, factory: impl LlmFactory + 'static) -> Self {
        Self {
            cfg,
            executor: Arc::new(executor),
            factory: Arc::new(factory),
        }
    }

    /// 按配置构建三个学习工具与 OpenAI 兼容客户端工厂
    pub fn from_config(cfg: AppConfig) -> Self {
        let embedder = Arc::new(OpenAiEmbedder::from_config(&cfg));
        let registry = default_toolkit(&cfg, embedder);
        let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);
        Self::new(cfg, executor, OpenAiFactory)
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub async fn run(
        &self,
        topic: &str,
        options: &StudyOptions,
        events: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<StudyPack, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::EmptyTopic);
        }

        let attempts = build_llm_attempts(&self.cfg.llm);
        let total = attempts.len();
        let run_id = Uuid::new_v4().to_string();
        let mut last_error: Option<PipelineError> = None;

        tracing::info!(run_id = %run_id, topic = %topic, attempts = total, ?options, "educational pipeline started");

        for (i, overrides) in attempts.iter().enumerate() {
            let index = i + 1;
            let settings = overrides.resolve(&self.cfg.llm);
            if !overrides.is_empty() {
                tracing::info!(
                    "Attempt {}/{} using overrides: {}",
                    index,
                    total,
                    overrides.sanitized()
                );
            }
            emit(
                events,
                PipelineEvent::AttemptStarted {
                    run_id: run_id.clone(),
                    attempt: index,
                    total,
                    provider: settings.provider.to_string(),
                    model: settings.model.clone(),
                    overrides: overrides.sanitized().to_string(),
                },
            );

            match self.run_attempt(topic, options, &settings, events).await {
                Ok(pack) => {
                    if index > 1 {
                        tracing::info!(
                            "Fallback succeeded on attempt {}/{} with overrides: {}",
                            index,
                            total,
                            overrides.sanitized()
                        );
                    }
                    emit(
                        events,
                        PipelineEvent::Completed {
                            topic: pack.topic.clone(),
                            filename: pack.suggested_filename(),
                            markdown: pack.to_markdown(),
                        },
                    );
                    return Ok(pack);
                }
                Err(e) => {
                    tracing::error!(
                        run_id = %run_id,
                        error = %e,
                        "Crew run failed on attempt {}/{} with overrides {}",
                        index,
                        total,
                        overrides.sanitized()
                    );
                    emit(
                        events,
                        PipelineEvent::AttemptFailed {
                            attempt: index,
                            total,
                            error: e.to_string(),
                        },
                    );
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| PipelineError::Config("no LLM attempts configured".to_string()));
        Err(PipelineError::AllAttemptsFailed {
            attempts: total,
            last: Box::new(last),
        })
    }

    async fn run_attempt(
        &self,
        topic: &str,
        options: &StudyOptions,
        settings: &LlmSettings,
        events: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<StudyPack, PipelineError> {
        let llm = self
            .factory
            .create(settings)
            .map_err(|e| PipelineError::Config(format!("LLM client: {}", e)))?;
        let crew = Crew::new(
            llm,
            self.executor.clone(),
            build_educational_tasks(options),
            &self.cfg.agents,
        );
        tracing::info!(
            "Educational crew kickoff started for topic: {} (provider={} model={} base_url={})",
            topic,
            settings.provider,
            settings.model,
            settings.base_url
        );
        crew.kickoff(topic, events).await
    }
}

fn emit(events: Option<&UnboundedSender<PipelineEvent>>, ev: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(ev);
    }
}

/// 运行完整学习流水线（含回退），返回学习包
pub async fn run_educational_pipeline(
    runtime: &PipelineRuntime,
    topic: &str,
    options: &StudyOptions,
) -> Result<StudyPack, PipelineError> {
    runtime.run(topic, options, None).await
}

/// 离线构建知识库索引（build-index 子命令）；返回块数
pub async fn build_knowledge_base(
    documents: &Path,
    index_dir: &Path,
    index: &IndexSection,
    embedder: &dyn EmbeddingProvider,
) -> Result<usize, PipelineError> {
    let chunking = ChunkingConfig::with_sizes(index.chunk_size, index.chunk_overlap);
    let count = build_index(documents, index_dir, chunking, embedder).await?;
    tracing::info!(chunks = count, index_dir = %index_dir.display(), "vector store built");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::rag::tests::KeywordEmbedder;
    use crate::memory::VectorIndex;

    #[tokio::test]
    async fn test_build_knowledge_base_uses_index_section() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("docs.txt");
        std::fs::write(&doc, "Python is fun.\n\nAtoms bond.\n\nDerivative rules.").unwrap();
        let index_dir = dir.path().join("store");
        let section = IndexSection {
            documents: doc.clone(),
            chunk_size: 20,
            chunk_overlap: 0,
        };

        let count = build_knowledge_base(&doc, &index_dir, &section, &KeywordEmbedder)
            .await
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(VectorIndex::load(&index_dir).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_documents_is_index_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_knowledge_base(
            &dir.path().join("missing.txt"),
            dir.path(),
            &IndexSection::default(),
            &KeywordEmbedder,
        )
        .await
        .unwrap_err();
        match err {
            PipelineError::Index(msg) => assert!(msg.contains("Document source not found")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
