pub mod engine;
pub mod knowledge;
pub mod pipeline;
pub mod tickets;

pub use engine::{RetryPolicy, TaskRunner};
pub use knowledge::{split_into_chunks, KnowledgeBase, SearchHit, SearchResult};
pub use pipeline::{EmailPipeline, EmailProcessingPayload, ProcessingResult};
pub use tickets::{customer_name_from_email, TicketResolver};
