//! 流水线集成测试：回退矩阵、工具调用与进度事件（Mock LLM，无需 API）

use std::sync::{Arc, Mutex};

use study_companion::config::AppConfig;
use study_companion::core::PipelineError;
use study_companion::llm::{LlmClient, LlmSettings, MockLlmClient};
use study_companion::pipeline::PipelineEvent;
use study_companion::tools::{CalculatorTool, ToolExecutor, ToolRegistry};
use study_companion::{run_educational_pipeline, Difficulty, PipelineRuntime, StudyOptions};
use tokio::sync::mpsc;

const PRIMARY: &str = "primary/model";
const BACKUP: &str = "backup/model";

fn calculator_executor() -> ToolExecutor {
    let mut registry = ToolRegistry::new();
    registry.register(CalculatorTool::new());
    ToolExecutor::new(registry, 5)
}

fn config_with_backup() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.llm.model = PRIMARY.to_string();
    cfg.llm.fallback_models = vec![BACKUP.to_string()];
    cfg
}

fn drain(mut rx: mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_fallback_advances_to_backup_model() {
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let seen_in_factory = Arc::clone(&seen);
    let runtime = PipelineRuntime::new(
        config_with_backup(),
        calculator_executor(),
        move |s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
            seen_in_factory.lock().unwrap().push(s.model.clone());
            if s.model == PRIMARY {
                Ok(Arc::new(MockLlmClient::failing("primary unavailable")))
            } else {
                Ok(Arc::new(MockLlmClient::new()))
            }
        },
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let pack = runtime
        .run("Photosynthesis", &StudyOptions::default(), Some(&tx))
        .await
        .unwrap();
    drop(tx);

    assert_eq!(pack.topic, "Photosynthesis");
    assert_eq!(pack.tasks.len(), 4);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first().map(String::as_str), Some(PRIMARY));
    assert_eq!(seen.last().map(String::as_str), Some(BACKUP));
    assert!(seen[..seen.len() - 1].iter().all(|m| m == PRIMARY));

    let events = drain(rx);
    let failed = events
        .iter()
        .filter(|e| matches!(e, PipelineEvent::AttemptFailed { .. }))
        .count();
    assert_eq!(failed, seen.len() - 1);
    assert!(matches!(events.last(), Some(PipelineEvent::Completed { .. })));
}

#[tokio::test]
async fn test_client_creation_failure_falls_through() {
    let runtime = PipelineRuntime::new(
        config_with_backup(),
        calculator_executor(),
        |s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
            if s.model == PRIMARY {
                Err("missing API key".to_string())
            } else {
                Ok(Arc::new(MockLlmClient::new()))
            }
        },
    );
    let options = StudyOptions {
        include_examples: false,
        include_quiz: false,
        difficulty: Difficulty::Beginner,
    };
    let pack = run_educational_pipeline(&runtime, "Atoms", &options).await.unwrap();
    assert_eq!(pack.tasks.len(), 2);
}

#[tokio::test]
async fn test_all_attempts_failed_reports_count_and_last_error() {
    let runtime = PipelineRuntime::new(
        config_with_backup(),
        calculator_executor(),
        |_s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
            Ok(Arc::new(MockLlmClient::failing("503 Service Unavailable")))
        },
    );
    let err = run_educational_pipeline(&runtime, "Atoms", &StudyOptions::default())
        .await
        .unwrap_err();
    match err {
        PipelineError::AllAttemptsFailed { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(last.to_string().contains("503 Service Unavailable"));
            assert!(matches!(*last, PipelineError::Agent { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_empty_topic_never_calls_llm() {
    let calls = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&calls);
    let runtime = PipelineRuntime::new(
        AppConfig::default(),
        calculator_executor(),
        move |_s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
            *counter.lock().unwrap() += 1;
            Ok(Arc::new(MockLlmClient::new()))
        },
    );
    let err = run_educational_pipeline(&runtime, "  \n ", &StudyOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyTopic));
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_tool_call_flows_into_study_pack() {
    let mock = Arc::new(MockLlmClient::with_replies([
        r#"{"tool": "educational_calculator", "args": {"query": "12 * 7"}}"#,
        "Final Answer: 1. Learn multiplication. 12 x 7 = 84.",
        "Final Answer: Notes on multiplication.",
    ]));
    let shared = Arc::clone(&mock);
    let runtime = PipelineRuntime::new(
        AppConfig::default(),
        calculator_executor(),
        move |_s: &LlmSettings| -> Result<Arc<dyn LlmClient>, String> {
            Ok(shared.clone())
        },
    );
    let options = StudyOptions {
        include_examples: false,
        include_quiz: false,
        difficulty: Difficulty::Intermediate,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let pack = runtime.run("Multiplication", &options, Some(&tx)).await.unwrap();
    drop(tx);

    assert_eq!(pack.tasks[0].output, "1. Learn multiplication. 12 x 7 = 84.");
    assert_eq!(pack.final_output(), "Notes on multiplication.");

    // 第二次调用应带上计算器的观察结果
    let calls = mock.calls();
    let observed = calls[1]
        .iter()
        .any(|m| m.content.contains("Calculation: 12 * 7 = 84"));
    assert!(observed);

    // 笔记任务的提示词携带规划任务的输出作为上下文
    let notes_prompt = &calls[2]
        .iter()
        .find(|m| m.content.contains("Current Task:"))
        .unwrap()
        .content;
    assert!(notes_prompt.contains("This is the context from the previous tasks:"));
    assert!(notes_prompt.contains("12 x 7 = 84"));

    let events = drain(rx);
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::ToolCall { tool, .. } if tool == "educational_calculator"
    )));
    let markdown = pack.to_markdown();
    assert!(markdown.contains("## Notes Generation"));
    assert!(markdown.contains("*Prepared by"));
}
