//! 任务循环：Plan -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出最终答案
//!
//! 每个任务独立一轮循环：任务 prompt 固定在首条 user 消息，工具往返写入按轮剪枝的短期记忆。
//! 工具失败以 `Error: ...` observation 回灌给模型，不中止任务；JSON 写坏时带纠正提示重试一次；
//! 调用智能体工具列表以外的工具返回 HallucinatedTool；步数耗尽返回 MaxStepsExceeded。

use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::{ConversationMemory, Message};
use crate::react::{parse_llm_output, Planner, PlannerOutput, ReactEvent};
use crate::tools::ToolExecutor;

/// 短期记忆保留的工具往返轮数
const HISTORY_TURNS: usize = 6;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 任务循环配置
pub struct TaskSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    pub max_steps: usize,
    /// 该智能体可用的工具；None 表示 executor 中的全部工具
    pub allowed_tools: Option<&'a [String]>,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> TaskSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        max_steps: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            max_steps,
            allowed_tools: None,
            event_tx: None,
        }
    }

    pub fn with_allowed_tools(mut self, tools: &'a [String]) -> Self {
        self.allowed_tools = Some(tools);
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn is_allowed(&self, tool: &str) -> bool {
        match self.allowed_tools {
            Some(names) if !names.is_empty() => names.iter().any(|n| n == tool),
            _ => self.executor.tool_names().iter().any(|n| n == tool),
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > OBSERVATION_PREVIEW_CHARS {
        let head: String = text.chars().take(OBSERVATION_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// 同类错误连续出现时只重试一次，第二次直接终止
fn recover_once(session: &TaskSession<'_>, err: &AgentError, retried: &mut bool) -> RecoveryAction {
    if *retried {
        return RecoveryAction::Abort;
    }
    let action = session.recovery.handle(err);
    if matches!(action, RecoveryAction::RetryWithPrompt(_)) {
        *retried = true;
    }
    action
}

/// 运行单个任务，返回最终答案
pub async fn run_task(
    session: &TaskSession<'_>,
    task_name: &str,
    task_prompt: &str,
) -> Result<String, AgentError> {
    if session.max_steps == 0 {
        return Err(AgentError::ConfigError(
            "agents.max_steps must be at least 1".to_string(),
        ));
    }

    let mut history = ConversationMemory::new(HISTORY_TURNS);
    let mut retried_parse = false;
    let mut retried_timeout = false;

    for step in 0..session.max_steps {
        session.send(ReactEvent::StepUpdate {
            step: step + 1,
            max_steps: session.max_steps,
        });

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::user(task_prompt.to_string()));
        messages.extend(history.messages().iter().cloned());
        if step + 1 == session.max_steps && step > 0 {
            messages.push(Message::user(
                "This is your last step. Do not call any more tools; reply now with \"Final Answer:\" followed by your complete answer.",
            ));
        }

        let output = match session.planner.plan(&messages).await {
            Ok(o) => {
                retried_timeout = false;
                o
            }
            Err(e) => match recover_once(session, &e, &mut retried_timeout) {
                RecoveryAction::RetryWithPrompt(prompt) => {
                    tracing::warn!(task = %task_name, step = step + 1, error = %e, "retrying LLM call");
                    session.send(ReactEvent::Recovery {
                        action: "RetryWithPrompt".to_string(),
                        detail: prompt.clone(),
                    });
                    history.push(Message::user(prompt));
                    continue;
                }
                RecoveryAction::Abort => {
                    session.send(ReactEvent::Recovery {
                        action: "Abort".to_string(),
                        detail: e.to_string(),
                    });
                    return Err(e);
                }
            },
        };

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(answer)) => {
                tracing::debug!(task = %task_name, step = step + 1, chars = answer.len(), "final answer");
                return Ok(answer);
            }
            Ok(PlannerOutput::ToolCall(tc)) => {
                retried_parse = false;
                session.send(ReactEvent::ToolCall {
                    tool: tc.tool.clone(),
                    args: tc.args.clone(),
                });
                if !session.is_allowed(&tc.tool) {
                    tracing::warn!(task = %task_name, tool = %tc.tool, "model requested an unknown tool");
                    return Err(AgentError::HallucinatedTool(tc.tool));
                }

                let observation = match session.executor.execute(&tc.tool, tc.args.clone()).await {
                    Ok(r) => r,
                    Err(e) => {
                        session.send(ReactEvent::ToolFailure {
                            tool: tc.tool.clone(),
                            reason: e.to_string(),
                        });
                        format!("Error: {}", e)
                    }
                };
                session.send(ReactEvent::Observation {
                    tool: tc.tool.clone(),
                    preview: preview(&observation),
                });

                history.push(Message::assistant(output));
                history.push(Message::user(format!(
                    "Observation from {}:\n{}",
                    tc.tool, observation
                )));
            }
            Err(e) => {
                match recover_once(session, &e, &mut retried_parse) {
                    RecoveryAction::RetryWithPrompt(prompt) => {
                        session.send(ReactEvent::Recovery {
                            action: "RetryWithPrompt".to_string(),
                            detail: prompt.clone(),
                        });
                        history.push(Message::assistant(output));
                        history.push(Message::user(prompt));
                    }
                    RecoveryAction::Abort => {
                        session.send(ReactEvent::Recovery {
                            action: "Abort".to_string(),
                            detail: e.to_string(),
                        });
                        return Err(e);
                    }
                }
            }
        }
    }

    Err(AgentError::MaxStepsExceeded {
        task: task_name.to_string(),
        steps: session.max_steps,
    })
}
