//! Planner：调用 LLM 并解析输出
//!
//! 模型每轮要么给出 JSON Tool Call（`{"tool": "...", "args": {...}}`），要么给出最终答案。
//! parse_llm_output 负责区分两者；只有“看起来想调用工具却写坏了 JSON”才算解析错误，
//! 笔记正文中出现的花括号不会被误判。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// 最终答案前缀
pub const FINAL_ANSWER: &str = "Final Answer:";

/// LLM 返回的 Tool Call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 最终答案
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 取出候选 JSON：优先 ```json 代码块，其次首个 `{` 到最后一个 `}`
fn json_candidate(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let rest = &text[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// 从 JSON 对象构造 ToolCall；缺少 args 时把除 tool 以外的字段当作参数
fn tool_call_from_value(value: Value) -> Option<ToolCall> {
    let Value::Object(mut obj) = value else {
        return None;
    };
    let tool = obj.remove("tool")?.as_str()?.trim().to_string();
    let args = match obj.remove("args") {
        Some(args) => args,
        None => Value::Object(obj),
    };
    Some(ToolCall { tool, args })
}

/// 解析 LLM 输出
///
/// - 含 `Final Answer:` 时取其后内容作为最终答案
/// - 含可解析且 tool 非空的 JSON 对象时为 ToolCall
/// - JSON 中出现 `"tool"` 但无法解析时返回 JsonParseError，交给恢复引擎纠正
/// - 其余情况整段文本即最终答案
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    if let Some(idx) = trimmed.rfind(FINAL_ANSWER) {
        let answer = trimmed[idx + FINAL_ANSWER.len()..].trim();
        if !answer.is_empty() {
            return Ok(PlannerOutput::Response(answer.to_string()));
        }
    }

    let Some(candidate) = json_candidate(trimmed) else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => match tool_call_from_value(value) {
            Some(tc) if !tc.tool.is_empty() => Ok(PlannerOutput::ToolCall(tc)),
            _ => Ok(PlannerOutput::Response(trimmed.to_string())),
        },
        Err(e) if candidate.contains("\"tool\"") => {
            Err(AgentError::JsonParseError(format!("{}: {}", e, candidate)))
        }
        Err(_) => Ok(PlannerOutput::Response(trimmed.to_string())),
    }
}

/// Planner：持有 LLM 与 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 以系统提示开头调用 LLM；超时映射为 NetworkTimeout，其余失败为 LlmError
    pub async fn plan(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = vec![Message::system(self.system_prompt.clone())];
        full_messages.extend(messages.iter().cloned());
        Ok(self.llm.complete(&full_messages).await?)
    }
}
