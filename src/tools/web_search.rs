//! 网页搜索工具：DuckDuckGo HTML 端点，无需 API Key
//!
//! 请求带超时与浏览器 User-Agent；从结果页提取标题、真实链接（解开 uddg 跳转）与摘要，
//! 排版后超过 max_result_chars 时截断并追加 ...[truncated]。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;

use crate::config::SearchSection;
use crate::tools::{query_from_args, Tool};

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 搜索后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBackend {
    Text,
    News,
}

impl SearchBackend {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "news" => SearchBackend::News,
            "text" | "" => SearchBackend::Text,
            other => {
                tracing::warn!(backend = %other, "unsupported search backend, falling back to text");
                SearchBackend::Text
            }
        }
    }
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq)]
pub struct WebHit {
    pub title: String,
    pub url: String,
    pub summary: String,
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?s)<a\s([^>]*class="result__a"[^>]*)>(.*?)</a>"#).unwrap())
}

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="([^"]*)""#).unwrap())
}

fn snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<(?:a|div|td)\s[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#).unwrap()
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// 去标签、解实体、合并空白
fn clean_text(html: &str) -> String {
    let stripped = tag_re().replace_all(html, "");
    html_escape::decode_html_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 把 DuckDuckGo 的跳转链接（//duckduckgo.com/l/?uddg=...）还原为目标 URL
fn resolve_href(raw: &str) -> String {
    let href = html_escape::decode_html_entities(raw).trim().to_string();
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{}", rest)
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{}", href)
    } else {
        href
    };
    if let Ok(url) = reqwest::Url::parse(&absolute) {
        if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
            return target.into_owned();
        }
    }
    absolute
}

/// 解析结果页；跳过广告条目，至多返回 limit 条
pub fn parse_results(html: &str, limit: usize) -> Vec<WebHit> {
    let titles: Vec<_> = title_re().captures_iter(html).collect();
    let mut hits = Vec::new();

    for (i, caps) in titles.iter().enumerate() {
        if hits.len() >= limit {
            break;
        }
        let (Some(whole), Some(attrs), Some(inner)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let raw_href = href_re()
            .captures(attrs.as_str())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or("");
        if raw_href.contains("duckduckgo.com/y.js") {
            continue;
        }

        // 摘要只在本条标题与下一条标题之间查找
        let block_end = titles
            .get(i + 1)
            .and_then(|c| c.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let summary = snippet_re()
            .captures(&html[whole.end()..block_end])
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .unwrap_or_default();

        hits.push(WebHit {
            title: clean_text(inner.as_str()),
            url: resolve_href(raw_href),
            summary,
        });
    }
    hits
}

/// 排版搜索结果；无结果时给出改写建议
pub fn format_results(query: &str, hits: &[WebHit]) -> String {
    if hits.is_empty() {
        return format!(
            "No web results found for '{}'. Try rephrasing the search query or use more specific educational terms.",
            query
        );
    }
    let rule = "─".repeat(60);
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let title = if hit.title.is_empty() { "Untitled result" } else { &hit.title };
            let summary = if hit.summary.trim().is_empty() {
                "No summary provided."
            } else {
                hit.summary.trim()
            };
            format!(
                "🔍 Source {}: {}\n📎 URL: {}\n📄 Summary: {}\n{}",
                i + 1,
                title,
                hit.url,
                summary,
                rule
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: String, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        text.chars().take(max_chars).collect::<String>() + "\n...[truncated]"
    } else {
        text
    }
}

/// 网页搜索工具
pub struct WebSearchTool {
    client: Client,
    max_results: usize,
    backend: SearchBackend,
    max_result_chars: usize,
}

impl WebSearchTool {
    pub fn new(cfg: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_results: cfg.max_results.max(1),
            backend: SearchBackend::parse(&cfg.backend),
            max_result_chars: cfg.max_result_chars,
        }
    }

    async fn fetch(&self, query: &str) -> Result<String, String> {
        let mut request = self.client.get(ENDPOINT).query(&[("q", query)]);
        if self.backend == SearchBackend::News {
            request = request.query(&[("iar", "news")]);
        }
        let resp = request.send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.text().await.map_err(|e| e.to_string())
    }

    pub async fn search(&self, query: &str) -> Result<String, String> {
        tracing::info!(query = %query, "educational web search");
        let html = self.fetch(query).await.map_err(|e| {
            tracing::error!(query = %query, error = %e, "DuckDuckGo search failed");
            format!("DuckDuckGo search failed: {}", e)
        })?;
        let hits = parse_results(&html, self.max_results);
        tracing::info!(query = %query, count = hits.len(), "web results found");
        Ok(truncate(format_results(query, &hits), self.max_result_chars))
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "educational_web_search"
    }

    fn description(&self) -> &str {
        "Search the web for educational content, definitions, examples, and current information. \
         Use it to find detailed explanations, real-world examples, recent developments and learning resources. \
         Provide a clear, specific query, e.g. 'photosynthesis process explained'. \
         Args: {\"query\": \"quadratic equation examples\"}"
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_from_args(&args).ok_or_else(|| "Missing query".to_string())?;
        self.search(query).await
    }
}
