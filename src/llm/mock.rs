//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预设回复；回复耗尽后返回最后一条用户消息的回显，或按配置直接报错 / 超时。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<Message>>>,
    fail_with: Option<LlmError>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序回放的回复
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    /// 每次调用都失败（模拟端点不可用）
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_with: Some(LlmError::Api(message.into())),
            ..Default::default()
        }
    }

    /// 每次调用都超时
    pub fn timing_out() -> Self {
        Self {
            fail_with: Some(LlmError::Timeout),
            ..Default::default()
        }
    }

    /// 已收到的全部请求（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        if let Some(reply) = self.replies.lock().ok().and_then(|mut q| q.pop_front()) {
            return Ok(reply);
        }
        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(format!("Final Answer: Echo from Mock: {}", last_user))
    }
}
