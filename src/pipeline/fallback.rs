//! 回退矩阵：provider × model × base_url 的有序去重组合
//!
//! 第一项总是空覆盖（即主配置）；openrouter 组在前，openai 组在后。

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::config::LlmSection;
use crate::llm::{LlmSettings, Provider};

/// 一次尝试相对主配置的覆盖项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LlmOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

impl LlmOverrides {
    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none() && self.base_url.is_none() && self.headers.is_none()
    }

    /// 日志用的脱敏形式：请求头只显示 `[set]`
    pub fn sanitized(&self) -> SanitizedOverrides<'_> {
        SanitizedOverrides(self)
    }

    /// 叠加到 [llm] 配置，得到本次尝试的完整连接参数
    pub fn resolve(&self, llm: &LlmSection) -> LlmSettings {
        let provider = self.provider.unwrap_or(Provider::OpenRouter);
        let headers = match provider {
            Provider::OpenRouter => llm.headers.clone(),
            Provider::OpenAi => self.headers.clone().unwrap_or_default(),
        };
        let api_key = match provider {
            Provider::OpenRouter => llm.resolve_api_key(),
            Provider::OpenAi => std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .or_else(|| llm.resolve_api_key()),
        };
        LlmSettings {
            provider,
            model: self.model.clone().unwrap_or_else(|| llm.model.clone()),
            base_url: self.base_url.clone().unwrap_or_else(|| llm.base_url.clone()),
            headers,
            api_key,
            temperature: llm.temperature,
            max_tokens: llm.max_tokens,
            timeout_secs: llm.timeouts.request,
        }
    }
}

pub struct SanitizedOverrides<'a>(&'a LlmOverrides);

impl fmt::Display for SanitizedOverrides<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = self.0;
        let mut parts = Vec::new();
        if let Some(p) = &o.provider {
            parts.push(format!("provider={}", p));
        }
        if let Some(m) = &o.model {
            parts.push(format!("model={}", m));
        }
        if let Some(u) = &o.base_url {
            parts.push(format!("base_url={}", u));
        }
        if o.headers.is_some() {
            parts.push("headers=[set]".to_string());
        }
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// 保序去重
fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// 构建有序回退列表
pub fn build_llm_attempts(llm: &LlmSection) -> Vec<LlmOverrides> {
    let base_urls = dedup(std::iter::once(llm.base_url.clone()).chain(llm.fallback_base_urls.iter().cloned()));
    let models = dedup(std::iter::once(llm.model.clone()).chain(llm.fallback_models.iter().cloned()));

    let mut attempts = Vec::new();
    let mut seen: HashSet<(Provider, &str, &str)> = HashSet::new();

    for provider in [Provider::OpenRouter, Provider::OpenAi] {
        for model in &models {
            for base_url in &base_urls {
                if !seen.insert((provider, model.as_str(), base_url.as_str())) {
                    continue;
                }

                let mut overrides = LlmOverrides::default();
                if *base_url != llm.base_url {
                    overrides.base_url = Some(base_url.clone());
                }
                match provider {
                    Provider::OpenRouter => {
                        if *model != llm.model {
                            overrides.model = Some(model.clone());
                        }
                    }
                    Provider::OpenAi => {
                        overrides.provider = Some(Provider::OpenAi);
                        overrides.model = Some(model.clone());
                        if !llm.headers.is_empty() {
                            overrides.headers = Some(llm.headers.clone());
                        }
                    }
                }
                attempts.push(overrides);
            }
        }
    }

    if attempts.is_empty() {
        attempts.push(LlmOverrides::default());
    }
    attempts
}
