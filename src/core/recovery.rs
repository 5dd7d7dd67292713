//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供任务循环决定是带提示重试还是终止。
//! 超时与 JSON 格式错误可重试；其余 LLM 失败一律 Abort，换模型 / 换端点由流水线的回退矩阵负责。

use crate::core::{AgentError, RecoveryAction};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::JsonParseError(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous tool call was not valid JSON: {raw}. \
                To use a tool, reply with exactly one JSON object and nothing else, \
                formatted as {{\"tool\": \"tool_name\", \"args\": {{\"query\": \"...\"}}}}. \
                If you are done, reply with your Final Answer as plain text instead."
            )),
            AgentError::NetworkTimeout => {
                RecoveryAction::RetryWithPrompt("The request timed out, please try again.".to_string())
            }
            _ => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovery_json_parse_error() {
        let engine = RecoveryEngine::new();
        let err = AgentError::JsonParseError("invalid json".to_string());
        match engine.handle(&err) {
            RecoveryAction::RetryWithPrompt(msg) => {
                assert!(msg.contains("JSON"));
                assert!(msg.contains("invalid json"));
            }
            other => panic!("Expected RetryWithPrompt, got {other:?}"),
        }
    }

    #[test]
    fn test_recovery_llm_error_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::LlmError("502 Bad Gateway".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }

    #[test]
    fn test_recovery_timeout_retries() {
        let engine = RecoveryEngine::new();
        let err: AgentError = crate::llm::LlmError::Timeout.into();
        assert!(matches!(err, AgentError::NetworkTimeout));
        assert!(matches!(engine.handle(&err), RecoveryAction::RetryWithPrompt(_)));
    }

    #[test]
    fn test_recovery_hallucinated_tool_aborts() {
        let engine = RecoveryEngine::new();
        let err = AgentError::HallucinatedTool("fake_tool".to_string());
        assert!(matches!(engine.handle(&err), RecoveryAction::Abort));
    }
}
