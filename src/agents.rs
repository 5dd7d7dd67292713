//! 学习智能体定义：四个固定角色（学习规划、笔记、例题、测验）
//!
//! 每个角色由人设（name / role / goal / backstory / system_prompt）与共享工具集组成；
//! 所有角色均不委派任务，只在自己的任务循环内调用工具。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::core::{AgentError, RecoveryEngine};
use crate::llm::LlmClient;
use crate::react::{run_task, Planner, ReactEvent, TaskSession};
use crate::tools::{tool_call_schema_json, ToolExecutor};

/// 智能体角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    StudyManager,
    NotesGenerator,
    ExampleSolver,
    QuizMaker,
}

impl AgentRole {
    /// 流水线中的固定顺序
    pub const ALL: [AgentRole; 4] = [
        AgentRole::StudyManager,
        AgentRole::NotesGenerator,
        AgentRole::ExampleSolver,
        AgentRole::QuizMaker,
    ];

    pub fn profile(self) -> AgentProfile {
        match self {
            AgentRole::StudyManager => AgentProfile {
                name: "Study Manager",
                role: "Educational Workflow Coordinator and Study Plan Architect",
                goal: "Orchestrate the creation of comprehensive study materials and define the learning plan and structure",
                backstory: "You are an experienced educational coordinator with expertise in curriculum design and learning outcomes. \
You excel at breaking down complex topics into manageable learning units and coordinating multiple specialized agents \
to create cohesive study materials. Your attention to detail and organizational skills make you perfect for managing \
the entire educational workflow from planning to final integration.",
                system_prompt: "You are the Study Manager, the orchestrator of the entire educational workflow. \
Your primary responsibility is to coordinate all study material creation activities and define the overall learning plan. \
You work with specialized agents (Notes Generator, Example Solver, Quiz Maker) to ensure comprehensive coverage of the study topic. \
You ensure consistency, completeness, and quality across all educational materials.",
            },
            AgentRole::NotesGenerator => AgentProfile {
                name: "Notes Generator",
                role: "Educational Content Synthesizer and Note Creator",
                goal: "Generate clear, bullet-point notes and concise summaries that make complex topics easy to understand",
                backstory: "You are a master educator with a gift for simplifying complex concepts. With years of experience in \
educational content creation, you know exactly how to break down difficult topics into bite-sized, memorable pieces. \
Your notes are renowned for their clarity, structure, and ability to help students grasp even the most challenging subjects. \
You understand different learning styles and create notes that work for visual, textual, and logical learners alike.",
                system_prompt: "You are the Notes Generator, specialized in creating clear, concise, and easy-to-understand study notes. \
Transform complex topics into digestible bullet-point notes and summaries that students can easily grasp. \
Focus on key concepts, definitions, and important points. Use simple language and logical organization. \
Your notes should be comprehensive yet concise, perfect for quick review and deep understanding.",
            },
            AgentRole::ExampleSolver => AgentProfile {
                name: "Example Solver",
                role: "Problem-Solving Expert and Solution Provider",
                goal: "Solve example problems with detailed step-by-step solutions that teach problem-solving techniques",
                backstory: "You are a seasoned problem solver with expertise across multiple subjects including mathematics, \
science, programming, and logic. Your passion is teaching through examples, showing students not just the answer but the \
journey to get there. You have a talent for breaking down complex problems into logical steps that anyone can follow. \
Your solutions are thorough yet accessible, making you the perfect mentor for students learning to solve problems independently.",
                system_prompt: "You are the Example Solver, an expert at solving educational problems with clear, step-by-step solutions. \
Your role is to work through example problems methodically, showing every step of the solution process. \
Break down complex problems into manageable steps, explain the reasoning behind each step, and provide clear annotations. \
Your solutions serve as learning tools that help students understand problem-solving techniques and apply them to similar problems.",
            },
            AgentRole::QuizMaker => AgentProfile {
                name: "Quiz Maker",
                role: "Assessment Designer and Question Creator",
                goal: "Create comprehensive practice questions including MCQs, short answers, and detailed answer keys",
                backstory: "You are an experienced assessment specialist with expertise in educational testing and evaluation. \
You understand Bloom's taxonomy and know how to create questions that test various cognitive levels. \
Your questions are carefully crafted to be fair, clear, and pedagogically sound. You believe that good assessments are \
learning opportunities, not just evaluation tools. Your answer keys don't just provide correct answers; they explain why \
answers are correct and help students understand common misconceptions.",
                system_prompt: "You are the Quiz Maker, specialized in creating comprehensive practice questions and assessments. \
Your role is to design multiple-choice questions (MCQs), short answer questions, and detailed answer keys. \
Create questions that test different levels of understanding: recall, comprehension, application, and analysis. \
Ensure questions are clear, fair, and educationally valuable. Provide detailed explanations in answer keys \
to help students learn from their mistakes and reinforce correct understanding.",
            },
        }
    }

    pub fn name(self) -> &'static str {
        self.profile().name
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 角色人设
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: &'static str,
    pub role: &'static str,
    pub goal: &'static str,
    pub backstory: &'static str,
    pub system_prompt: &'static str,
}

/// 拼接完整 system prompt：人设 + 可用工具 + 调用协议 + Tool Call JSON Schema
pub fn build_system_prompt(profile: &AgentProfile, tool_descriptions: &[(String, String)]) -> String {
    let mut prompt = format!(
        "{}\n\nName: {}\nRole: {}\nGoal: {}\nBackstory: {}",
        profile.system_prompt, profile.name, profile.role, profile.goal, profile.backstory
    );

    if !tool_descriptions.is_empty() {
        let tool_list = tool_descriptions
            .iter()
            .map(|(name, desc)| format!("- {}: {}", name, desc))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!("\n\nAvailable tools:\n{}\n", tool_list));
    }

    prompt.push_str(
        "\n\nHow to work:\n\
         - To use a tool, reply with ONLY one JSON object: {\"tool\": \"<tool name>\", \"args\": {\"query\": \"<input>\"}}. \
         You will receive the tool's observation in the next message.\n\
         - Use tools only when they add value; you may call several tools one after another.\n\
         - When you are ready, reply with \"Final Answer:\" followed by the complete deliverable in Markdown. \
         Do not include any tool-call JSON in the final answer.",
    );

    let schema = tool_call_schema_json();
    if !schema.is_empty() {
        prompt.push_str(&format!(
            "\n\n## Tool call JSON Schema (you must output valid JSON matching this)\n```json\n{}\n```",
            schema
        ));
    }
    prompt
}

/// 一个智能体：人设 + 绑定了 system prompt 的 Planner + 可用工具名
pub struct Agent {
    pub role: AgentRole,
    pub profile: AgentProfile,
    planner: Planner,
    allowed_tools: Vec<String>,
    recovery: RecoveryEngine,
}

impl Agent {
    pub fn new(role: AgentRole, llm: Arc<dyn LlmClient>, tool_descriptions: &[(String, String)]) -> Self {
        let profile = role.profile();
        let system_prompt = build_system_prompt(&profile, tool_descriptions);
        Self {
            role,
            profile,
            planner: Planner::new(llm, system_prompt),
            allowed_tools: tool_descriptions.iter().map(|(n, _)| n.clone()).collect(),
            recovery: RecoveryEngine::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.profile.name
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.allowed_tools
    }

    pub fn system_prompt(&self) -> &str {
        self.planner.base_system_prompt()
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.planner.token_usage()
    }

    /// 在工具增强的任务循环中完成一个任务，返回最终答案
    pub async fn execute_task(
        &self,
        task_name: &str,
        task_prompt: &str,
        executor: &ToolExecutor,
        max_steps: usize,
        event_tx: Option<&UnboundedSender<ReactEvent>>,
    ) -> Result<String, AgentError> {
        let mut session = TaskSession::new(&self.planner, executor, &self.recovery, max_steps)
            .with_allowed_tools(&self.allowed_tools);
        if let Some(tx) = event_tx {
            session = session.with_event_tx(tx);
        }
        tracing::info!(agent = %self.name(), task = %task_name, "agent started task");
        run_task(&session, task_name, task_prompt).await
    }
}

/// 创建四个学习智能体（共享同一 LLM 客户端与工具集），顺序与 AgentRole::ALL 一致
pub fn create_study_agents(llm: Arc<dyn LlmClient>, executor: &ToolExecutor) -> Vec<Agent> {
    let tools = executor.tool_descriptions();
    AgentRole::ALL
        .iter()
        .map(|role| Agent::new(*role, llm.clone(), &tools))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::tools::{CalculatorTool, ToolRegistry};

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool::new());
        ToolExecutor::new(registry, 5)
    }

    #[test]
    fn test_four_agents_in_order() {
        let agents = create_study_agents(Arc::new(MockLlmClient::new()), &executor());
        let names: Vec<_> = agents.iter().map(|a| a.name()).collect();
        assert_eq!(names, ["Study Manager", "Notes Generator", "Example Solver", "Quiz Maker"]);
        assert!(agents.iter().all(|a| a.allowed_tools() == ["educational_calculator"]));
    }

    #[test]
    fn test_system_prompt_contents() {
        let agents = create_study_agents(Arc::new(MockLlmClient::new()), &executor());
        let prompt = agents[3].system_prompt();
        assert!(prompt.starts_with("You are the Quiz Maker"));
        assert!(prompt.contains("Goal: Create comprehensive practice questions"));
        assert!(prompt.contains("- educational_calculator:"));
        assert!(prompt.contains("Final Answer:"));
        assert!(prompt.contains("Tool call JSON Schema"));
    }

    #[tokio::test]
    async fn test_execute_task_returns_final_answer() {
        let mock = Arc::new(MockLlmClient::with_replies(["Final Answer: - point one\n- point two"]));
        let agent = Agent::new(AgentRole::NotesGenerator, mock, &executor().tool_descriptions());
        let out = agent
            .execute_task("Notes Generation", "Write notes", &executor(), 3, None)
            .await
            .unwrap();
        assert_eq!(out, "- point one\n- point two");
    }
}
