//! Crew：按顺序执行任务，每个任务交给绑定角色的智能体
//!
//! 前序任务的产出作为上下文拼在后续任务 prompt 之前，超过 context_chars 时只保留最近部分。
//! 任一任务失败即整次 kickoff 失败，由上层回退循环换下一组 LLM 配置重跑。

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedSender};

use crate::agents::{create_study_agents, Agent};
use crate::config::AgentsSection;
use crate::core::{AgentError, PipelineError};
use crate::llm::LlmClient;
use crate::pipeline::{PipelineEvent, StudyPack, TaskOutput};
use crate::react::ReactEvent;
use crate::tasks::TaskSpec;
use crate::tools::ToolExecutor;

const TRUNCATED_MARKER: &str = "...[earlier context truncated]\n";

pub struct Crew {
    agents: Vec<Agent>,
    tasks: Vec<TaskSpec>,
    executor: Arc<ToolExecutor>,
    max_steps: usize,
    context_chars: usize,
}

impl Crew {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        executor: Arc<ToolExecutor>,
        tasks: Vec<TaskSpec>,
        agents_cfg: &AgentsSection,
    ) -> Self {
        Self {
            agents: create_study_agents(llm, &executor),
            tasks,
            executor,
            max_steps: agents_cfg.max_steps,
            context_chars: agents_cfg.context_chars,
        }
    }

    pub async fn kickoff(
        &self,
        topic: &str,
        events: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<StudyPack, PipelineError> {
        let total = self.tasks.len();
        let mut outputs: Vec<TaskOutput> = Vec::with_capacity(total);

        for (i, task) in self.tasks.iter().enumerate() {
            let agent = self
                .agents
                .iter()
                .find(|a| a.role == task.role)
                .ok_or_else(|| PipelineError::Config(format!("no agent for task '{}'", task.name)))?;

            emit(
                events,
                PipelineEvent::TaskStarted {
                    task: task.name.to_string(),
                    agent: agent.name().to_string(),
                    index: i + 1,
                    total,
                },
            );

            let context = build_context(&outputs, self.context_chars);
            let prompt = task.prompt(topic, context.as_deref());
            let output = self
                .run_agent(agent, task, &prompt, events)
                .await
                .map_err(|source| PipelineError::Agent {
                    task: task.name.to_string(),
                    source,
                })?;

            tracing::info!(task = %task.name, agent = %agent.name(), chars = output.len(), "task completed");
            tracing::debug!("Task '{}' output:\n{}", task.name, output);
            emit(
                events,
                PipelineEvent::TaskCompleted {
                    task: task.name.to_string(),
                    agent: agent.name().to_string(),
                    chars: output.len(),
                },
            );

            outputs.push(TaskOutput {
                name: task.name.to_string(),
                agent: agent.name().to_string(),
                output,
            });
        }

        if let Some(agent) = self.agents.first() {
            let (prompt, completion, total) = agent.token_usage();
            tracing::info!(prompt, completion, total, "token usage");
        }

        let pack = StudyPack::new(topic, outputs);
        tracing::info!(
            "Crew completed with final output length={} characters",
            pack.final_output().len()
        );
        Ok(pack)
    }

    /// 运行单个任务；有事件通道时把任务循环中的工具调用与工具失败转成流水线事件
    async fn run_agent(
        &self,
        agent: &Agent,
        task: &TaskSpec,
        prompt: &str,
        events: Option<&UnboundedSender<PipelineEvent>>,
    ) -> Result<String, AgentError> {
        let Some(events) = events else {
            return agent
                .execute_task(task.name, prompt, &self.executor, self.max_steps, None)
                .await;
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<ReactEvent>();
        let run = async move {
            let result = agent
                .execute_task(task.name, prompt, &self.executor, self.max_steps, Some(&tx))
                .await;
            drop(tx);
            result
        };
        let forward = async {
            while let Some(ev) = rx.recv().await {
                let forwarded = match ev {
                    ReactEvent::ToolCall { tool, args } => PipelineEvent::ToolCall {
                        task: task.name.to_string(),
                        tool,
                        args,
                    },
                    ReactEvent::ToolFailure { tool, reason } => PipelineEvent::ToolFailed {
                        task: task.name.to_string(),
                        tool,
                        reason,
                    },
                    _ => continue,
                };
                let _ = events.send(forwarded);
            }
        };
        let (result, ()) = tokio::join!(run, forward);
        result
    }
}

fn emit(events: Option<&UnboundedSender<PipelineEvent>>, ev: PipelineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(ev);
    }
}

/// 拼接前序任务产出；max_chars 为 0 表示不截断
pub fn build_context(outputs: &[TaskOutput], max_chars: usize) -> Option<String> {
    if outputs.is_empty() {
        return None;
    }
    let full = outputs
        .iter()
        .map(|o| format!("## {}\n{}", o.name, o.output.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    let count = full.chars().count();
    if max_chars == 0 || count <= max_chars {
        return Some(full);
    }
    let tail: String = full.chars().skip(count - max_chars).collect();
    Some(format!("{}{}", TRUNCATED_MARKER, tail))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tasks::{build_educational_tasks, StudyOptions};
    use crate::tools::{CalculatorTool, ToolRegistry};

    fn executor() -> Arc<ToolExecutor> {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool::new());
        Arc::new(ToolExecutor::new(registry, 5))
    }

    fn output(name: &str, text: &str) -> TaskOutput {
        TaskOutput {
            name: name.to_string(),
            agent: "a".to_string(),
            output: text.to_string(),
        }
    }

    #[test]
    fn test_build_context() {
        assert_eq!(build_context(&[], 100), None);
        let outs = vec![output("Plan", "p"), output("Notes", "n")];
        assert_eq!(build_context(&outs, 100).unwrap(), "## Plan\np\n\n## Notes\nn");

        let truncated = build_context(&outs, 8).unwrap();
        assert!(truncated.starts_with(TRUNCATED_MARKER));
        assert!(truncated.ends_with(" Notes\nn"));
        assert_eq!(truncated.chars().count(), TRUNCATED_MARKER.len() + 8);
        assert_eq!(build_context(&outs, 0).unwrap().len(), "## Plan\np\n\n## Notes\nn".len());
    }

    #[tokio::test]
    async fn test_kickoff_runs_tasks_in_order_with_context() {
        let mock = Arc::new(MockLlmClient::with_replies([
            "Final Answer: PLAN",
            r#"{"tool": "educational_calculator", "args": {"query": "2 ** 10"}}"#,
            "Final Answer: NOTES",
        ]));
        let options = StudyOptions {
            include_examples: false,
            include_quiz: false,
            ..Default::default()
        };
        let crew = Crew::new(
            mock.clone(),
            executor(),
            build_educational_tasks(&options),
            &AgentsSection::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pack = crew.kickoff("Binary numbers", Some(&tx)).await.unwrap();

        assert_eq!(pack.tasks.len(), 2);
        assert_eq!(pack.tasks[0].output, "PLAN");
        assert_eq!(pack.tasks[1].agent, "Notes Generator");
        assert_eq!(pack.final_output(), "NOTES");

        // 笔记任务的 prompt 含规划产出
        let calls = mock.calls();
        assert!(calls[1][1].content.contains("## Study Management & Planning\nPLAN"));
        assert!(calls[2].last().unwrap().content.contains("= 1024"));

        drop(tx);
        let mut kinds = Vec::new();
        while let Some(ev) = rx.recv().await {
            kinds.push(serde_json::to_value(&ev).unwrap()["type"].as_str().unwrap().to_string());
        }
        assert_eq!(
            kinds,
            ["task_started", "task_completed", "task_started", "tool_call", "task_completed"]
        );
    }

    struct UnreachableSearch;

    #[async_trait::async_trait]
    impl crate::tools::Tool for UnreachableSearch {
        fn name(&self) -> &str {
            "educational_web_search"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<String, String> {
            Err("network unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn test_tool_failure_is_forwarded_and_task_continues() {
        let mut registry = ToolRegistry::new();
        registry.register(UnreachableSearch);
        let mock = Arc::new(MockLlmClient::with_replies([
            r#"{"tool": "educational_web_search", "args": {"query": "binary"}}"#,
            "Final Answer: PLAN",
            "Final Answer: NOTES",
        ]));
        let options = StudyOptions {
            include_examples: false,
            include_quiz: false,
            ..Default::default()
        };
        let crew = Crew::new(
            mock.clone(),
            Arc::new(ToolExecutor::new(registry, 5)),
            build_educational_tasks(&options),
            &AgentsSection::default(),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let pack = crew.kickoff("Binary numbers", Some(&tx)).await.unwrap();
        assert_eq!(pack.tasks[0].output, "PLAN");
        assert!(mock.calls()[1].last().unwrap().content.contains("network unreachable"));

        drop(tx);
        let mut failed = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let PipelineEvent::ToolFailed { task, tool, reason } = ev {
                failed.push((task, tool, reason));
            }
        }
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, "Study Management & Planning");
        assert_eq!(failed[0].1, "educational_web_search");
        assert!(failed[0].2.contains("network unreachable"));
    }

    #[tokio::test]
    async fn test_task_failure_is_pipeline_error() {
        let crew = Crew::new(
            Arc::new(MockLlmClient::failing("503")),
            executor(),
            build_educational_tasks(&StudyOptions::default()),
            &AgentsSection::default(),
        );
        let err = crew.kickoff("t", None).await.unwrap_err();
        assert!(matches!(err, PipelineError::Agent { ref task, .. } if task == "Study Management & Planning"));
    }
}
