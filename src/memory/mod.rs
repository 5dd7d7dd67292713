//! 记忆层：任务内对话历史、RAG 知识库

pub mod conversation;
pub mod rag;

pub use conversation::{ConversationMemory, Message, Role};
pub use rag::{build_index, Chunk, Chunker, ChunkingConfig, IndexError, RetrievalResult, VectorIndex};
