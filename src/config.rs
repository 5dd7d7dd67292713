//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STUDY__*` 覆盖（双下划线表示嵌套，如 `STUDY__LLM__MODEL=openai/gpt-4o`）。

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agents: AgentsSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、输出目录、日志文件
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// CLI `--save` 时学习包的写入目录
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_file: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            output_dir: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
            log_file: "workshop.log".to_string(),
        }
    }
}

/// [llm] 段：主模型与回退矩阵的原料（备用模型、备用端点、附加请求头）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    pub fallback_models: Vec<String>,
    pub fallback_base_urls: Vec<String>,
    /// OpenRouter 推荐的 HTTP-Referer / X-Title 等；加载后键名为小写
    pub headers: BTreeMap<String, String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeouts: LlmTimeoutsSection,
}

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            fallback_models: Vec::new(),
            fallback_base_urls: Vec::new(),
            headers: BTreeMap::new(),
            api_key: None,
            temperature: 0.7,
            max_tokens: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    /// API Key：配置优先，其次 OPENROUTER_API_KEY，最后 OPENAI_API_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次补全请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [agents] 段：单个任务内的工具调用步数上限、前序任务上下文长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentsSection {
    pub max_steps: usize,
    pub context_chars: usize,
}

impl Default for AgentsSection {
    fn default() -> Self {
        Self {
            max_steps: 8,
            context_chars: 6000,
        }
    }
}

/// [tools] 段：工具超时、Web 搜索、知识库检索、索引构建
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub search: SearchSection,
    pub retriever: RetrieverSection,
    pub index: IndexSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            search: SearchSection::default(),
            retriever: RetrieverSection::default(),
            index: IndexSection::default(),
        }
    }
}

/// [tools.search] 段：DuckDuckGo 结果数、后端（text / news）、超时、结果截断
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub max_results: usize,
    pub backend: String,
    pub timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_results: 5,
            backend: "text".to_string(),
            timeout_secs: 15,
            max_result_chars: 8000,
        }
    }
}

/// [tools.retriever] 段：预构建索引目录、top_k、嵌入模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieverSection {
    pub index_dir: PathBuf,
    pub top_k: usize,
    pub embedding_model: String,
    /// 未设置时与 llm.base_url 相同
    pub embedding_base_url: Option<String>,
}

impl Default for RetrieverSection {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("rag/vectorstore"),
            top_k: 4,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_base_url: None,
        }
    }
}

/// [tools.index] 段：build-index 的源文档与分块参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    pub documents: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            documents: PathBuf::from("rag/documents/sample_docs.txt"),
            chunk_size: 600,
            chunk_overlap: 50,
        }
    }
}

/// 从 config 目录加载配置，环境变量 STUDY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STUDY__*（双下划线表示嵌套键）
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
        } else {
            tracing::warn!(path = %path.display(), "config file not found, skipping");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STUDY")
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("llm.fallback_models")
            .with_list_parse_key("llm.fallback_base_urls")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 重新从磁盘与环境变量加载配置
pub fn reload_config() -> Result<AppConfig, config::ConfigError> {
    load_config(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.llm.model, DEFAULT_MODEL);
        assert!(cfg.llm.fallback_models.is_empty());
        assert_eq!(cfg.tools.retriever.top_k, 4);
        assert_eq!(cfg.tools.search.max_results, 5);
        assert_eq!(cfg.tools.index.chunk_size, 600);
        assert_eq!(cfg.tools.index.chunk_overlap, 50);
        assert_eq!(cfg.app.log_file, "workshop.log");
    }

    #[test]
    fn test_load_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
model = "anthropic/claude-3-haiku"
fallback_models = ["openai/gpt-4o-mini", "meta-llama/llama-3.1-8b-instruct"]
fallback_base_urls = ["https://api.openai.com/v1"]

[llm.headers]
"X-Title" = "Study Companion"

[agents]
max_steps = 3
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "anthropic/claude-3-haiku");
        assert_eq!(cfg.llm.fallback_models.len(), 2);
        assert_eq!(cfg.llm.fallback_base_urls, vec!["https://api.openai.com/v1"]);
        // config 会把键名转为小写；HTTP 头名大小写不敏感
        assert_eq!(cfg.llm.headers.get("x-title").map(String::as_str), Some("Study Companion"));
        assert!(!cfg.llm.headers.contains_key("X-Title"));
        assert_eq!(cfg.agents.max_steps, 3);
        // 未出现的段保持默认
        assert_eq!(cfg.agents.context_chars, 6000);
        assert_eq!(cfg.llm.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_configured_api_key_wins() {
        let section = LlmSection {
            api_key: Some("sk-config".to_string()),
            ..Default::default()
        };
        assert_eq!(section.resolve_api_key().as_deref(), Some("sk-config"));
    }
}
