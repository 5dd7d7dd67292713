//! 学习包：各任务产出的汇总与 Markdown 导出

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// 单个任务的产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub name: String,
    pub agent: String,
    pub output: String,
}

#[derive(Debug, Clone)]
pub struct StudyPack {
    pub topic: String,
    pub generated_at: DateTime<Local>,
    pub tasks: Vec<TaskOutput>,
}

impl StudyPack {
    pub fn new(topic: impl Into<String>, tasks: Vec<TaskOutput>) -> Self {
        Self {
            topic: topic.into(),
            generated_at: Local::now(),
            tasks,
        }
    }

    /// 最后一个任务的产出（流水线的“最终结果”）
    pub fn final_output(&self) -> &str {
        self.tasks.last().map(|t| t.output.as_str()).unwrap_or("")
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!(
            "# 📚 Study Pack: {}\n\n*Generated on {}*\n",
            self.topic,
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        );
        for task in &self.tasks {
            md.push_str(&format!(
                "\n---\n\n## {}\n\n*Prepared by {}*\n\n{}\n",
                task.name,
                task.agent,
                task.output.trim()
            ));
        }
        md
    }

    /// `study_pack_{主题前 30 字符，空格换下划线}_{时间戳}.md`
    pub fn suggested_filename(&self) -> String {
        let stem: String = self
            .topic
            .chars()
            .take(30)
            .map(|c| match c {
                ' ' | '/' | '\\' => '_',
                other => other,
            })
            .collect();
        format!(
            "study_pack_{}_{}.md",
            stem,
            self.generated_at.format("%Y%m%d_%H%M%S")
        )
    }
}
