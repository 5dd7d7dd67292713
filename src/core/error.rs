//! 错误类型与恢复动作
//!
//! AgentError 描述单个智能体在一次任务中遇到的问题；PipelineError 描述整条流水线（含回退矩阵）的失败。

use thiserror::Error;

use crate::llm::LlmError;
use crate::memory::IndexError;

/// 智能体运行过程中可能出现的错误（LLM、解析、工具、步数上限等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Network timeout")]
    NetworkTimeout,

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 在步数上限内仍未给出最终答案
    #[error("Task '{task}' produced no final answer within {steps} steps")]
    MaxStepsExceeded { task: String, steps: usize },

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 流水线级错误：任一任务失败即整次尝试失败，由回退循环决定是否换下一组配置
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Study topic must not be empty")]
    EmptyTopic,

    #[error("Task '{task}' failed: {source}")]
    Agent {
        task: String,
        #[source]
        source: AgentError,
    },

    #[error("All {attempts} LLM attempts failed; last error: {last}")]
    AllAttemptsFailed {
        attempts: usize,
        last: Box<PipelineError>,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Index error: {0}")]
    Index(String),
}

impl From<LlmError> for AgentError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout => AgentError::NetworkTimeout,
            LlmError::Api(msg) => AgentError::LlmError(msg),
        }
    }
}

impl From<IndexError> for PipelineError {
    fn from(e: IndexError) -> Self {
        PipelineError::Index(e.to_string())
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让 LLM 重试（如 JSON 格式错误）
    RetryWithPrompt(String),
    /// 终止当前任务，交给回退循环
    Abort,
}
