//! Study Companion 命令行入口
//!
//! 子命令：run（生成学习包）、build-index（构建知识库向量索引）、check-key（验证 API Key）。

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use study_companion::config::{load_config, AppConfig};
use study_companion::llm::OpenAiEmbedder;
use study_companion::pipeline::build_knowledge_base;
use study_companion::{observability, Difficulty, PipelineRuntime, StudyOptions};

const DEFAULT_TOPIC: &str = "Introduction to Python Programming";

/// Study Companion: generate comprehensive study materials using AI agents
#[derive(Parser, Debug)]
#[command(name = "study-companion")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra config file layered over config/default.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a study pack for a topic
    Run {
        /// Study topic (e.g. 'Calculus: Derivatives and Integration')
        #[arg(short, long, default_value = DEFAULT_TOPIC)]
        topic: String,

        /// Skip the example problem solving task
        #[arg(long)]
        no_examples: bool,

        /// Skip the quiz creation task
        #[arg(long)]
        no_quiz: bool,

        /// Target level: Beginner, Intermediate or Advanced
        #[arg(short, long, default_value = "Intermediate")]
        difficulty: Difficulty,

        /// Write the Markdown study pack to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Save the study pack under app.output_dir with a generated file name
        #[arg(long, conflicts_with = "output")]
        save: bool,
    },

    /// Build the knowledge base vector store from a document
    BuildIndex {
        /// Source document (defaults to tools.index.documents)
        #[arg(long)]
        documents: Option<PathBuf>,

        /// Output directory (defaults to tools.retriever.index_dir)
        #[arg(long)]
        index_dir: Option<PathBuf>,
    },

    /// Verify the API key against the configured endpoint's /models
    CheckKey,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;

    if let Err(e) = observability::init(&cfg.app) {
        observability::init_console();
        tracing::warn!(error = %e, "log file unavailable, logging to console only");
    }

    let command = cli.command.unwrap_or(Commands::Run {
        topic: DEFAULT_TOPIC.to_string(),
        no_examples: false,
        no_quiz: false,
        difficulty: Difficulty::default(),
        output: None,
        save: false,
    });

    match command {
        Commands::Run {
            topic,
            no_examples,
            no_quiz,
            difficulty,
            output,
            save,
        } => {
            let options = StudyOptions {
                include_examples: !no_examples,
                include_quiz: !no_quiz,
                difficulty,
            };
            let target = match (output, save) {
                (Some(path), _) => Some(path),
                (None, true) => Some(cfg.app.output_dir.clone()),
                (None, false) => None,
            };
            run(cfg, &topic, &options, target, save).await
        }
        Commands::BuildIndex {
            documents,
            index_dir,
        } => build(&cfg, documents, index_dir).await,
        Commands::CheckKey => check_key(&cfg).await,
    }
}

fn rule() -> String {
    "=".repeat(70)
}

async fn run(
    cfg: AppConfig,
    topic: &str,
    options: &StudyOptions,
    target: Option<PathBuf>,
    target_is_dir: bool,
) -> anyhow::Result<()> {
    println!("\n{}", rule());
    println!("📚 Study Companion - AI-Powered Study Pack Generator");
    println!("{}", rule());
    println!("\n🎯 Generating study materials for: {}", topic);
    println!("\n⏳ This may take 2-5 minutes. AI agents are working...\n");

    tracing::info!("Starting Study Companion for topic: {}", topic);
    let runtime = PipelineRuntime::from_config(cfg);
    let pack = runtime
        .run(topic, options, None)
        .await
        .context("Study pack generation failed")?;
    let markdown = pack.to_markdown();

    println!("\n{}", rule());
    println!("✅ Study Pack Generated Successfully!");
    println!("{}\n", rule());
    println!("{}", markdown);
    println!("\n{}", rule());

    match target {
        Some(path) => {
            let path = if target_is_dir {
                path.join(pack.suggested_filename())
            } else {
                path
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(&path, &markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("💾 Saved to {}", path.display());
        }
        None => println!("💡 Tip: use --save or --output to write this pack to a .md file."),
    }
    println!("{}\n", rule());
    Ok(())
}

async fn build(
    cfg: &AppConfig,
    documents: Option<PathBuf>,
    index_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let documents = documents.unwrap_or_else(|| cfg.tools.index.documents.clone());
    let index_dir = index_dir.unwrap_or_else(|| cfg.tools.retriever.index_dir.clone());
    let embedder = OpenAiEmbedder::from_config(cfg);

    println!("📄 Loading {}", documents.display());
    let count = build_knowledge_base(&documents, &index_dir, &cfg.tools.index, &embedder)
        .await
        .context("Failed to build vector store")?;
    println!("✅ Vector store with {} chunks saved to {}", count, index_dir.display());
    Ok(())
}

async fn check_key(cfg: &AppConfig) -> anyhow::Result<()> {
    let Some(key) = cfg.llm.resolve_api_key() else {
        bail!("No API key found; set llm.api_key, OPENROUTER_API_KEY or OPENAI_API_KEY");
    };
    let preview: String = key.chars().take(12).collect();
    println!("✓ Found API key: {}...", preview);

    let url = format!("{}/models", cfg.llm.base_url.trim_end_matches('/'));
    println!("\n🔍 Testing API key against {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(cfg.llm.timeouts.request))
        .build()
        .context("Failed to build HTTP client")?;
    let resp = client
        .get(&url)
        .bearer_auth(&key)
        .send()
        .await
        .with_context(|| format!("Request to {} failed", url))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("Error: {} - {}", status, body);
    }
    let body: serde_json::Value = resp.json().await.context("Invalid /models response")?;
    let count = body
        .get("data")
        .and_then(|d| d.as_array())
        .map(|a| a.len())
        .unwrap_or(0);
    println!("✅ API key works! Found {} available models", count);
    println!("\nNext step: run 'study-companion build-index' to build the vector store");
    Ok(())
}
