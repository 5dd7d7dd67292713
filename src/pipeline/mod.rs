//! 编排层：回退矩阵、Crew 顺序执行、学习包、进度事件

pub mod crew;
pub mod events;
pub mod fallback;
pub mod pack;
pub mod runner;

pub use crew::Crew;
pub use events::PipelineEvent;
pub use fallback::{build_llm_attempts, LlmOverrides};
pub use pack::{StudyPack, TaskOutput};
pub use runner::{build_knowledge_base, run_educational_pipeline, LlmFactory, OpenAiFactory, PipelineRuntime};
