use crate::error::{ApiError, Result};
use crate::state::AppState;
use agent::EmailProcessingPayload;
use axum::async_trait;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use chrono::Utc;
use helpdesk_core::error::HelpdeskError;
use helpdesk_core::types::{new_id, EmailDirection, EmailLog, MessageStatus, TicketMessage};
use mail::{InboundEmail, VerifiedEmail};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, instrument};

/// Text fields of an inbound-parse post, multipart or urlencoded.
/// Attachment parts are skipped.
pub struct InboundForm(pub HashMap<String, String>);

#[async_trait]
impl<S> FromRequest<S> for InboundForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::Rejected(e.body_text()))?;
            return Ok(Self(fields));
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| ApiError::Rejected(e.body_text()))?;
        let mut fields = HashMap::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Rejected(e.body_text()))?
        {
            if field.file_name().is_some() {
                continue;
            }
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::Rejected(e.body_text()))?;
            fields.insert(name, value);
        }
        Ok(Self(fields))
    }
}

fn inbound_message_id() -> String {
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
    format!("inbound_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// Records the email, opens or reuses its ticket, and hands the rest of the
/// work to the task runner. Replies to the provider before any AI work.
#[instrument(skip_all)]
pub async fn receive_inbound(
    State(state): State<AppState>,
    InboundForm(fields): InboundForm,
) -> Result<Json<Value>> {
    let VerifiedEmail { sender, email } = InboundEmail::from_form(&fields)
        .verify()
        .map_err(|e| match e {
            HelpdeskError::Validation(reason) => ApiError::Rejected(reason),
            other => ApiError::Rejected(other.to_string()),
        })?;
    info!(from = %sender, subject = %email.subject, attachments = email.attachments, "Inbound email accepted");

    let fail = state.fail("Erro interno no processamento do e-mail");
    let inbound_id = inbound_message_id();

    let log = EmailLog {
        id: new_id(),
        message_id: inbound_id.clone(),
        from: email.from.clone(),
        to: email.to.clone(),
        subject: email.subject.clone(),
        body: email.text.clone(),
        status: MessageStatus::Received,
        direction: EmailDirection::Inbound,
        ticket_id: None,
        created_at: Utc::now(),
    };
    state.sqlite.save_email_log(&log).await.map_err(&fail)?;

    let customer = state.resolver.resolve_customer(&sender).await.map_err(&fail)?;
    let ticket = state
        .resolver
        .resolve_ticket(&customer, &email.subject, &email.text)
        .await
        .map_err(&fail)?
        .ticket;

    let mut message = TicketMessage::from_customer(&ticket.id, &customer.id, email.text.clone());
    message.metadata.message_id = Some(inbound_id.clone());
    let stored = state.sqlite.save_message(&message).await.map_err(&fail)?;
    state
        .sqlite
        .link_email_log(&log.id, &ticket.id, MessageStatus::Processing)
        .await
        .map_err(&fail)?;

    let payload = EmailProcessingPayload {
        from: sender,
        to: email.to,
        subject: email.subject,
        html: Some(email.html).filter(|h| !h.trim().is_empty()),
        text: email.text,
        message_id: Some(inbound_id.clone()),
        ..Default::default()
    };
    // Detached: the runner logs its own outcome.
    drop(state.runner.dispatch(payload));
    info!(ticket_id = %ticket.id, message_id = %inbound_id, "Processing dispatched");

    Ok(Json(json!({
        "status": "success",
        "ticketId": ticket.id,
        "messageId": stored.id,
    })))
}

pub async fn webhook_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "SendGrid Inbound Webhook",
        "timestamp": Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_ids_are_prefixed_and_unique() {
        let a = inbound_message_id();
        let b = inbound_message_id();
        assert!(a.starts_with("inbound_"));
        assert_eq!(a.rsplit('_').next().map(str::len), Some(9));
        assert_ne!(a, b);
    }
}
