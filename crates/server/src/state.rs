//! Shared application state and service wiring.

use crate::config::{AiProviderKind, Config, VectorBackend};
use crate::error::ApiError;
use agent::{EmailPipeline, KnowledgeBase, TaskRunner, TicketResolver};
use ai::{AiProvider, GeneratorOptions, OllamaProvider, OpenAICompatibleProvider, ResponseGenerator};
use helpdesk_core::error::{HelpdeskError, Result};
use mail::{EmailSender, SendGridClient};
use secrecy::ExposeSecret;
use std::sync::Arc;
use storage::{MemoryIndex, QdrantStorage, SqliteStorage, VectorIndex};
use tracing::info;

/// Handles to every service the routes need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub sqlite: Arc<SqliteStorage>,
    pub resolver: Arc<TicketResolver>,
    pub knowledge: Arc<KnowledgeBase>,
    pub runner: TaskRunner,
    pub sender: Arc<dyn EmailSender>,
    pub dev_mode: bool,
}

impl AppState {
    pub fn new(
        sqlite: Arc<SqliteStorage>,
        knowledge: Arc<KnowledgeBase>,
        runner: TaskRunner,
        sender: Arc<dyn EmailSender>,
        dev_mode: bool,
    ) -> Self {
        Self {
            resolver: Arc::new(TicketResolver::new(sqlite.clone())),
            sqlite,
            knowledge,
            runner,
            sender,
            dev_mode,
        }
    }

    /// Connects the database and builds the provider clients from `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let sqlite = Arc::new(SqliteStorage::connect(&config.database_url).await?);

        let index: Arc<dyn VectorIndex> = match config.vector_backend {
            VectorBackend::Qdrant => Arc::new(QdrantStorage::new(
                &config.qdrant_url,
                config.qdrant_api_key.as_ref().map(|k| k.expose_secret()),
                config.collection.clone(),
                config.embedding_dim,
            )?),
            VectorBackend::Memory => Arc::new(MemoryIndex::new(config.collection.clone(), config.embedding_dim)),
        };

        let provider: Arc<dyn AiProvider> = match config.ai_provider {
            AiProviderKind::Ollama => Arc::new(OllamaProvider::new(
                config.ai_base_url.clone(),
                Some(config.chat_model.clone()),
                Some(config.embedding_model.clone()),
            )),
            AiProviderKind::OpenAi => Arc::new(OpenAICompatibleProvider::new(
                config.ai_base_url.clone(),
                config.openai_api_key.clone(),
                Some(config.chat_model.clone()),
                Some(config.embedding_model.clone()),
            )),
        };
        info!(provider = ?config.ai_provider, index = %index.name(), "Services configured");

        let knowledge = Arc::new(
            KnowledgeBase::new(sqlite.clone(), index, provider.clone()).with_chunk_size(config.chunk_size),
        );
        let generator = Arc::new(ResponseGenerator::new(
            provider,
            GeneratorOptions {
                chat_model: Some(config.chat_model.clone()),
                summary_model: Some(config.summary_model.clone()),
                ..GeneratorOptions::default()
            },
        ));
        let sender: Arc<dyn EmailSender> = Arc::new(SendGridClient::new(
            config.sendgrid_api_key.clone(),
            config.sendgrid_from.clone(),
        ));
        if !sender.is_configured() {
            tracing::warn!("SENDGRID_API_KEY is not set; replies will not be sent");
        }

        let pipeline = Arc::new(EmailPipeline::new(
            sqlite.clone(),
            knowledge.clone(),
            generator,
            sender.clone(),
        ));
        let runner = TaskRunner::new(pipeline, config.retry, config.task_max_duration);

        Ok(Self::new(sqlite, knowledge, runner, sender, config.dev_mode))
    }

    /// Error mapper for handlers; `message` is the public text of a 500.
    pub fn fail(&self, message: &'static str) -> impl Fn(HelpdeskError) -> ApiError {
        let dev_mode = self.dev_mode;
        move |err| ApiError::from_domain(err, message, dev_mode)
    }
}
