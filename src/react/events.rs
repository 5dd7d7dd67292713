//! 任务循环过程事件：工具调用、观察、恢复动作，由流水线转发给前端

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 当前步数
    StepUpdate { step: usize, max_steps: usize },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation { tool: String, preview: String },
    /// 工具执行失败（已作为 observation 回灌给模型）
    ToolFailure { tool: String, reason: String },
    /// 恢复动作（RetryWithPrompt / Abort）
    Recovery { action: String, detail: String },
}
