//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）、嵌入、连接参数

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod settings;
pub mod traits;

pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{create_llm, OpenAiClient, TokenUsage};
pub use settings::{LlmSettings, Provider};
pub use traits::{LlmClient, LlmError};
