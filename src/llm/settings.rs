//! 单次尝试的 LLM 连接参数
//!
//! 回退矩阵里的每一项覆盖（provider / model / base_url / headers）叠加到 [llm] 配置后得到一份 LlmSettings。

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// 模型服务商：两者都走 OpenAI 兼容协议，区别在于密钥来源与附加请求头
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenRouter,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 已解析的连接参数
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub provider: Provider,
    pub model: String,
    pub base_url: String,
    pub headers: BTreeMap<String, String>,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}
