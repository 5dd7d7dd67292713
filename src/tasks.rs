//! 学习任务定义：规划、笔记、例题、测验
//!
//! 每个任务绑定一个智能体角色，描述中以 `{topic}` 作为主题占位符；
//! StudyOptions 决定是否包含例题与测验，以及目标难度。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;

/// 目标难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Difficulty {
    #[serde(alias = "beginner")]
    Beginner,
    #[default]
    #[serde(alias = "intermediate")]
    Intermediate,
    #[serde(alias = "advanced")]
    Advanced,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Beginner => "Beginner",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Advanced => "Advanced",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!(
                "unknown difficulty '{}'; expected Beginner, Intermediate or Advanced",
                other
            )),
        }
    }
}

/// 学习包选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyOptions {
    pub include_examples: bool,
    pub include_quiz: bool,
    pub difficulty: Difficulty,
}

impl Default for StudyOptions {
    fn default() -> Self {
        Self {
            include_examples: true,
            include_quiz: true,
            difficulty: Difficulty::default(),
        }
    }
}

/// 单个任务
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: &'static str,
    pub role: AgentRole,
    /// 含 `{topic}` 占位符
    pub description_template: String,
    pub expected_output: &'static str,
}

impl TaskSpec {
    /// 替换主题占位符
    pub fn render(&self, topic: &str) -> String {
        self.description_template.replace("{topic}", topic)
    }

    /// 交给智能体的完整任务 prompt；context 为前序任务的产出
    pub fn prompt(&self, topic: &str, context: Option<&str>) -> String {
        let mut prompt = String::new();
        if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
            prompt.push_str("This is the context from the previous tasks:\n");
            prompt.push_str(ctx);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!(
            "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n\n\
             You MUST return the actual complete content as the final answer, not a summary.",
            self.render(topic),
            self.expected_output
        ));
        prompt
    }
}

fn study_management_task() -> TaskSpec {
    TaskSpec {
        name: "Study Management & Planning",
        role: AgentRole::StudyManager,
        description_template: "Analyze the study topic '{topic}' and create a comprehensive learning plan. \
Define learning objectives, identify key concepts to cover, and establish the structure for the final study pack. \
Coordinate with other agents to ensure complete coverage of notes, examples, quizzes, and visual aids."
            .to_string(),
        expected_output: "A detailed study plan outlining: 1) Learning objectives, 2) Key topics and subtopics, \
3) Coordination guidelines for other agents, 4) Quality criteria, and 5) Final study pack structure.",
    }
}

fn notes_generation_task() -> TaskSpec {
    TaskSpec {
        name: "Notes Generation",
        role: AgentRole::NotesGenerator,
        description_template: "Create comprehensive yet easy-to-understand study notes on '{topic}'. \
Use the knowledge base and web search tools to gather accurate information. \
Transform complex concepts into clear, bullet-point notes. Include: \
1) Key definitions, 2) Core concepts explained simply, 3) Important facts and principles, \
4) Concise summaries of each major topic. Organize notes logically with clear headings."
            .to_string(),
        expected_output: "Well-structured study notes in bullet-point format with clear section headings. \
Each section should include: definitions, key concepts, important points, and a brief summary. \
Notes should be concise, easy to read, and suitable for quick review and deep study.",
    }
}

fn example_solving_task() -> TaskSpec {
    TaskSpec {
        name: "Example Problem Solving",
        role: AgentRole::ExampleSolver,
        description_template: "Create and solve example problems related to '{topic}'. \
Generate 3-5 relevant example problems that cover key concepts. \
For each problem, provide: 1) Clear problem statement, 2) Step-by-step solution with detailed explanations, \
3) Reasoning behind each step, 4) Final answer. Use the calculator tool for any numerical computations. \
Problems should range from basic to intermediate difficulty."
            .to_string(),
        expected_output: "A collection of 3-5 solved example problems. Each problem should include: \
- Problem Statement (clear and specific), \
- Step-by-Step Solution (numbered steps with explanations), \
- Annotations explaining the reasoning, \
- Final Answer with verification where applicable.",
    }
}

fn quiz_making_task() -> TaskSpec {
    TaskSpec {
        name: "Quiz Creation",
        role: AgentRole::QuizMaker,
        description_template: "Design a comprehensive practice quiz for '{topic}'. Create: \
1) 10 Multiple Choice Questions (MCQs) with 4 options each, 2) 5 Short Answer Questions, \
3) A detailed answer key with explanations. Questions should test different cognitive levels: \
recall, understanding, application, and analysis. Ensure questions are clear, fair, and educationally valuable. \
The answer key should explain why each answer is correct and address common misconceptions."
            .to_string(),
        expected_output: "A complete practice quiz containing: \
- Section 1: 10 MCQs with 4 options each (labeled A-D), \
- Section 2: 5 Short Answer Questions, \
- Section 3: Comprehensive Answer Key with: \
  * Correct answers for all questions, \
  * Detailed explanations for each answer, \
  * Common mistakes to avoid.",
    }
}

/// 按选项构建有序任务列表；规划与笔记始终包含
pub fn build_educational_tasks(options: &StudyOptions) -> Vec<TaskSpec> {
    let mut tasks = vec![study_management_task(), notes_generation_task()];
    if options.include_examples {
        tasks.push(example_solving_task());
    }
    if options.include_quiz {
        tasks.push(quiz_making_task());
    }

    let level = format!(
        " Target difficulty level: {}. Pitch explanations, examples and questions at this level.",
        options.difficulty
    );
    for task in &mut tasks {
        task.description_template.push_str(&level);
    }
    tasks
}
