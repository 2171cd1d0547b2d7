pub mod generator;
pub mod provider;

pub use generator::{AiResponse, GeneratorOptions, KnowledgeContext, KnowledgeSnippet, ResponseGenerator, TicketContext};
pub use provider::{AiProvider, ChatRequest, ChatResponse, FinishReason, Message, OllamaProvider, OpenAICompatibleProvider, Usage};
