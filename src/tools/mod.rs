//! 学习工具集：计算器、知识库检索、网页搜索
//!
//! 三个工具在进程内各构建一次，通过 ToolExecutor 共享给所有智能体与每一轮回退尝试。

pub mod calculator;
pub mod executor;
pub mod knowledge;
pub mod registry;
pub mod schema;
pub mod web_search;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::EmbeddingProvider;

pub use calculator::CalculatorTool;
pub use executor::ToolExecutor;
pub use knowledge::KnowledgeSearchTool;
pub use registry::{query_from_args, Tool, ToolRegistry};
pub use schema::tool_call_schema_json;
pub use web_search::WebSearchTool;

/// 按配置注册三个学习工具
pub fn default_toolkit(cfg: &AppConfig, embedder: Arc<dyn EmbeddingProvider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool::new());
    registry.register(KnowledgeSearchTool::new(
        cfg.tools.retriever.index_dir.clone(),
        cfg.tools.retriever.top_k,
        embedder,
    ));
    registry.register(WebSearchTool::new(&cfg.tools.search));
    tracing::debug!(tools = ?registry.tool_names(), "toolkit ready");
    registry
}
