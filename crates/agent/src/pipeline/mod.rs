pub mod draft;

use crate::knowledge::KnowledgeBase;
use crate::tickets::TicketResolver;
use ai::{AiResponse, KnowledgeContext, KnowledgeSnippet, ResponseGenerator, TicketContext};
use chrono::{DateTime, Utc};
use helpdesk_core::error::{HelpdeskError, Result};
use helpdesk_core::types::{LogLevel, MessageMetadata, MessageStatus, TicketMessage};
use mail::{extract_email_address, inbound::is_valid_address, reply_subject, EmailSender, OutboundEmail};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::SqliteStorage;
use tracing::{error, info, instrument, warn};

pub const LOG_SOURCE: &str = "EMAIL_PROCESSING";
const SEARCH_LIMIT: usize = 3;
const HISTORY_LIMIT: usize = 5;

/// Input of one processing run, as handed over by the webhook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailProcessingPayload {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub customer_id: String,
    pub ticket_id: String,
    pub message_id: String,
    pub response_id: String,
    pub ai_response: AiResponse,
    pub search_result_count: usize,
    pub email_sent: bool,
    pub timestamp: DateTime<Utc>,
}

/// Turns one inbound email into a stored conversation turn and a sent reply.
pub struct EmailPipeline {
    sqlite: Arc<SqliteStorage>,
    resolver: TicketResolver,
    knowledge: Arc<KnowledgeBase>,
    generator: Arc<ResponseGenerator>,
    sender: Arc<dyn EmailSender>,
}

impl EmailPipeline {
    pub fn new(
        sqlite: Arc<SqliteStorage>,
        knowledge: Arc<KnowledgeBase>,
        generator: Arc<ResponseGenerator>,
        sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            resolver: TicketResolver::new(sqlite.clone()),
            sqlite,
            knowledge,
            generator,
            sender,
        }
    }

    /// Runs every step once. Failures are recorded in the system log and
    /// returned wrapped; retrying is the caller's job.
    #[instrument(skip(self, payload), fields(subject = %payload.subject))]
    pub async fn process(&self, payload: &EmailProcessingPayload) -> Result<ProcessingResult> {
        info!("Processing inbound email");
        match self.run(payload).await {
            Ok(result) => {
                info!(ticket_id = %result.ticket_id, response_id = %result.response_id, "Processing finished");
                Ok(result)
            }
            Err(e) => {
                let e = e.context("process inbound email");
                error!("Processing failed: {}", e);
                self.record_failure(payload, &e).await;
                Err(e)
            }
        }
    }

    async fn run(&self, payload: &EmailProcessingPayload) -> Result<ProcessingResult> {
        // 1. validate
        if payload.from.trim().is_empty() || payload.text.trim().is_empty() {
            return Err(HelpdeskError::Validation("Invalid email payload".into()));
        }
        let sender_address = extract_email_address(&payload.from);
        if !is_valid_address(&sender_address) {
            return Err(HelpdeskError::Validation(format!(
                "Invalid sender address: {}",
                payload.from
            )));
        }

        // 2-3. customer and ticket
        let customer = self.resolver.resolve_customer(&sender_address).await?;
        let ticket = self
            .resolver
            .resolve_ticket(&customer, &payload.subject, &payload.text)
            .await?
            .ticket;

        // 4. inbound message, at most once per inbound id
        let mut inbound = TicketMessage::from_customer(&ticket.id, &customer.id, payload.text.clone());
        inbound.metadata = MessageMetadata {
            message_id: payload.message_id.clone(),
            in_reply_to: payload.in_reply_to.clone(),
            references: payload.references.clone(),
            ..Default::default()
        };
        let inbound = self.sqlite.save_message(&inbound).await?;

        let history: Vec<String> = self
            .sqlite
            .list_ticket_messages(&ticket.id)
            .await?
            .into_iter()
            .filter(|m| m.id != inbound.id && m.status != MessageStatus::Draft)
            .map(|m| m.content)
            .collect();
        let history = history[history.len().saturating_sub(HISTORY_LIMIT)..].to_vec();

        // 5. knowledge base
        let search = self
            .knowledge
            .search_similar(&payload.text, SEARCH_LIMIT, None)
            .await?;
        let knowledge = (!search.documents.is_empty()).then(|| KnowledgeContext {
            documents: search
                .documents
                .iter()
                .map(|d| KnowledgeSnippet {
                    title: d.title.clone(),
                    content: d.content.clone(),
                    relevance: d.relevance,
                })
                .collect(),
        });

        // 6. reply
        let context = TicketContext {
            subject: ticket.subject.clone(),
            previous_messages: history,
            customer_name: Some(customer.name.clone()),
        };
        let ai_response = self
            .generator
            .generate_response(&payload.text, &context, knowledge.as_ref())
            .await?;

        // 7. draft
        let mut reply = TicketMessage::system_draft(&ticket.id, ai_response.content.clone());
        reply.metadata.generated_by_ai = true;
        reply.metadata.search_results_used = Some(search.total_results);
        let reply = self.sqlite.save_message(&reply).await?;

        // 8. send
        let email = OutboundEmail::new(&sender_address, reply_subject(&payload.subject))
            .text(draft::render_reply_text(&ai_response.content, &ticket.id))
            .html(draft::render_reply_html(&ai_response.content, &ticket.id))
            .threaded(payload.message_id.clone(), thread_references(payload));
        // Permanent send failures keep the draft; transient ones rerun the task.
        let receipt = match self.sender.send(&email).await {
            Ok(receipt) => Some(receipt),
            Err(e) if !e.is_retryable() => {
                warn!(ticket_id = %ticket.id, "Reply kept as draft, not sent: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        // 9. bookkeeping
        let now = Utc::now();
        let email_sent = receipt.is_some();
        if let Some(receipt) = receipt {
            let mut sent_metadata = reply.metadata.clone();
            sent_metadata.provider_message_id = receipt.message_id;
            self.sqlite
                .update_message_status(&reply.id, MessageStatus::Sent, Some(&sent_metadata))
                .await?;
            self.sqlite.mark_ticket_responded(&ticket.id, now).await?;
        }

        Ok(ProcessingResult {
            customer_id: customer.id,
            ticket_id: ticket.id,
            message_id: inbound.id,
            response_id: reply.id,
            ai_response,
            search_result_count: search.total_results,
            email_sent,
            timestamp: now,
        })
    }

    async fn record_failure(&self, payload: &EmailProcessingPayload, err: &HelpdeskError) {
        let metadata = serde_json::json!({
            "payload": payload,
            "error": err.to_string(),
        });
        if let Err(log_err) = self
            .sqlite
            .save_log(
                LogLevel::Error,
                LOG_SOURCE,
                &format!("Erro ao processar e-mail: {}", err),
                Some(&metadata),
            )
            .await
        {
            warn!("Could not write system log: {}", log_err);
        }
    }
}

/// Existing `References` chain with the inbound message id appended.
fn thread_references(payload: &EmailProcessingPayload) -> Option<String> {
    let parts: Vec<&str> = [payload.references.as_deref(), payload.message_id.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}
