use crate::error::{ApiError, Result};
use crate::state::AppState;
use agent::pipeline::draft::escape_html;
use axum::extract::State;
use axum::Json;
use mail::OutboundEmail;
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn email_status(State(state): State<AppState>) -> Json<Value> {
    let configured = state.sender.is_configured();
    let message = if configured {
        "SendGrid configurado"
    } else {
        "SendGrid não configurado"
    };
    Json(json!({
        "status": "success",
        "message": message,
        "configured": configured,
        "fromEmail": state.sender.from_address(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct TestEmailRequest {
    to: Option<String>,
    subject: Option<String>,
    message: Option<String>,
}

pub async fn send_test_email(
    State(state): State<AppState>,
    Json(request): Json<TestEmailRequest>,
) -> Result<Json<Value>> {
    let to = request
        .to
        .filter(|to| !to.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Destinatário (to) é obrigatório".into()))?;
    let subject = request
        .subject
        .unwrap_or_else(|| "Teste do Sistema Kvn Suporte".to_string());
    let message = request
        .message
        .unwrap_or_else(|| "Este é um e-mail de teste do sistema.".to_string());

    let email = OutboundEmail::new(to.trim(), subject)
        .html(format!("<p>{}</p>", escape_html(&message)))
        .text(message);
    let receipt = state
        .sender
        .send(&email)
        .await
        .map_err(state.fail("Erro ao enviar e-mail"))?;

    Ok(Json(json!({
        "status": "success",
        "message": "E-mail enviado com sucesso",
        "to": email.to,
        "messageId": receipt.message_id,
    })))
}
