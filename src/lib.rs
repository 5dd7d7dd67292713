//! Study Companion - 多智能体学习资料生成器
//!
//! 模块划分：
//! - **agents**: 四个学习角色（规划、笔记、例题、测验）的人设与任务执行
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与恢复策略
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、连接参数
//! - **memory**: 任务内对话历史与 RAG 知识库
//! - **observability**: 控制台 + 文件日志
//! - **pipeline**: 回退矩阵、Crew 顺序执行、学习包
//! - **react**: Planner 与工具增强的任务循环
//! - **tasks**: 四个学习任务与生成选项
//! - **tools**: 计算器、知识库检索、网页搜索与执行器

pub mod agents;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod react;
pub mod tasks;
pub mod tools;

pub use pipeline::{run_educational_pipeline, PipelineRuntime, StudyPack};
pub use tasks::{Difficulty, StudyOptions};
