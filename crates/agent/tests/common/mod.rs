#![allow(dead_code)]

use agent::{EmailPipeline, KnowledgeBase};
use ai::provider::Usage;
use ai::{AiProvider, ChatRequest, ChatResponse, FinishReason, GeneratorOptions, ResponseGenerator};
use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use mail::{EmailSender, OutboundEmail, SendReceipt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storage::{MemoryIndex, SqliteStorage};

pub const DIM: usize = 64;
pub const REPLY: &str = "Olá Jane,\nUse o link \"Esqueci minha senha\".";

/// Bag-of-words embeddings hashed into `DIM` buckets, and a canned reply.
#[derive(Default)]
pub struct FakeAi {
    pub prompts: Mutex<Vec<String>>,
}

pub fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let hash = word
            .to_lowercase()
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
        v[hash as usize % DIM] += 1.0;
    }
    v
}

#[async_trait]
impl AiProvider for FakeAi {
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        if let Some(user) = request.messages.last() {
            self.prompts.lock().unwrap().push(user.content.clone());
        }
        Ok(ChatResponse {
            content: REPLY.into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
        })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embed(text))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["fake".into()])
    }
}

pub enum SendFailure {
    Transient,
    Unconfigured,
}

/// Fails the first `failures` sends, then records every delivered email.
pub struct FakeSender {
    failures: usize,
    kind: SendFailure,
    pub attempts: AtomicUsize,
    pub sent: Mutex<Vec<OutboundEmail>>,
}

impl FakeSender {
    pub fn reliable() -> Self {
        Self::failing(0, SendFailure::Transient)
    }

    pub fn failing(failures: usize, kind: SendFailure) -> Self {
        Self {
            failures,
            kind,
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EmailSender for FakeSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(match self.kind {
                SendFailure::Transient => HelpdeskError::Email("connection reset".into()),
                SendFailure::Unconfigured => HelpdeskError::Configuration("no api key".into()),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(SendReceipt {
            message_id: Some(format!("sg-{}", attempt)),
        })
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn from_address(&self) -> &str {
        "suporte@exemplo.com"
    }
}

pub struct Harness {
    pub db: Arc<SqliteStorage>,
    pub index: Arc<MemoryIndex>,
    pub ai: Arc<FakeAi>,
    pub sender: Arc<FakeSender>,
    pub knowledge: Arc<KnowledgeBase>,
    pub pipeline: Arc<EmailPipeline>,
}

pub async fn harness(sender: FakeSender) -> Harness {
    harness_with_chunk_size(sender, 1000).await
}

pub async fn harness_with_chunk_size(sender: FakeSender, chunk_size: usize) -> Harness {
    let db = Arc::new(SqliteStorage::in_memory().await.unwrap());
    let index = Arc::new(MemoryIndex::new("test-index", DIM as u64));
    let ai = Arc::new(FakeAi::default());
    let sender = Arc::new(sender);

    let knowledge = Arc::new(
        KnowledgeBase::new(db.clone(), index.clone(), ai.clone()).with_chunk_size(chunk_size),
    );
    let generator = Arc::new(ResponseGenerator::new(ai.clone(), GeneratorOptions::default()));
    let pipeline = Arc::new(EmailPipeline::new(
        db.clone(),
        knowledge.clone(),
        generator,
        sender.clone(),
    ));

    Harness {
        db,
        index,
        ai,
        sender,
        knowledge,
        pipeline,
    }
}
