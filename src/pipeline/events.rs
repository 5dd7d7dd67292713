//! 流水线进度事件：供 Web 端 NDJSON 流展示

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// 开始第 attempt 次尝试（overrides 已脱敏）
    AttemptStarted {
        run_id: String,
        attempt: usize,
        total: usize,
        provider: String,
        model: String,
        overrides: String,
    },
    AttemptFailed {
        attempt: usize,
        total: usize,
        error: String,
    },
    TaskStarted {
        task: String,
        agent: String,
        index: usize,
        total: usize,
    },
    ToolCall {
        task: String,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具报错或超时；任务继续，错误作为观察结果交给模型
    ToolFailed {
        task: String,
        tool: String,
        reason: String,
    },
    TaskCompleted {
        task: String,
        agent: String,
        chars: usize,
    },
    /// 成功结束，附带完整 Markdown
    Completed {
        topic: String,
        filename: String,
        markdown: String,
    },
    Error {
        message: String,
    },
}
