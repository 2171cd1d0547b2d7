use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, instrument};

pub const DEFAULT_API_URL: &str = "https://api.sendgrid.com";
pub const DEFAULT_FROM: &str = "suporte@exemplo.com";

/// An email to send. `from` falls back to the sender's configured address.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutboundEmail {
    pub to: String,
    pub from: Option<String>,
    pub subject: String,
    pub text: Option<String>,
    pub html: Option<String>,
    pub reply_to: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            ..Default::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Sets `In-Reply-To` and `References`. Empty values are dropped.
    pub fn threaded(mut self, in_reply_to: Option<String>, references: Option<String>) -> Self {
        self.in_reply_to = in_reply_to.filter(|v| !v.is_empty());
        self.references = references.filter(|v| !v.is_empty());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Provider-assigned id, when the provider reports one.
    pub message_id: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt>;

    fn is_configured(&self) -> bool;

    fn from_address(&self) -> &str;
}

pub struct SendGridClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<SecretString>,
    from_address: String,
}

impl SendGridClient {
    pub fn new(api_key: Option<SecretString>, from_address: impl Into<String>) -> Self {
        Self::with_api_url(DEFAULT_API_URL, api_key, from_address)
    }

    pub fn with_api_url(api_url: &str, api_key: Option<SecretString>, from_address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
            from_address: from_address.into(),
        }
    }

    fn build_body(&self, email: &OutboundEmail) -> Value {
        let mut content = Vec::new();
        if let Some(text) = &email.text {
            content.push(json!({ "type": "text/plain", "value": text }));
        }
        if let Some(html) = &email.html {
            content.push(json!({ "type": "text/html", "value": html }));
        }

        let mut headers = Map::new();
        if let Some(v) = &email.in_reply_to {
            headers.insert("In-Reply-To".into(), v.clone().into());
        }
        if let Some(v) = &email.references {
            headers.insert("References".into(), v.clone().into());
        }

        let mut body = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": email.from.as_deref().unwrap_or(&self.from_address) },
            "subject": email.subject,
            "content": content,
        });
        if !headers.is_empty() {
            body["headers"] = Value::Object(headers);
        }
        if let Some(reply_to) = &email.reply_to {
            body["reply_to"] = json!({ "email": reply_to });
        }
        body
    }
}

#[async_trait]
impl EmailSender for SendGridClient {
    #[instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| HelpdeskError::Configuration("SENDGRID_API_KEY não configurada".into()))?;

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.api_url))
            .bearer_auth(key.expose_secret())
            .json(&self.build_body(email))
            .send()
            .await
            .map_err(|e| HelpdeskError::Email(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HelpdeskError::Email(format!("SendGrid returned {}: {}", status, body)));
        }

        let message_id = response
            .headers()
            .get("x-message-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        info!(message_id = ?message_id, "Email sent successfully");

        Ok(SendReceipt { message_id })
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn from_address(&self) -> &str {
        &self.from_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SendGridClient {
        SendGridClient::new(Some(SecretString::from("SG.test".to_string())), DEFAULT_FROM)
    }

    #[test]
    fn body_carries_threading_headers_and_both_parts() {
        let email = OutboundEmail::new("jane@x.com", "Re: Help")
            .text("plain")
            .html("<p>html</p>")
            .threaded(Some("<abc@x>".into()), Some(String::new()));
        let body = client().build_body(&email);

        assert_eq!(body["personalizations"][0]["to"][0]["email"], "jane@x.com");
        assert_eq!(body["from"]["email"], DEFAULT_FROM);
        assert_eq!(body["content"][0]["type"], "text/plain");
        assert_eq!(body["content"][1]["value"], "<p>html</p>");
        assert_eq!(body["headers"]["In-Reply-To"], "<abc@x>");
        assert!(body["headers"].get("References").is_none());
    }

    #[test]
    fn body_omits_headers_when_unthreaded() {
        let mut email = OutboundEmail::new("jane@x.com", "Hi").text("t");
        email.from = Some("ops@x.com".into());
        let body = client().build_body(&email);
        assert!(body.get("headers").is_none());
        assert_eq!(body["from"]["email"], "ops@x.com");
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let sender = SendGridClient::new(None, DEFAULT_FROM);
        assert!(!sender.is_configured());
        let err = sender.send(&OutboundEmail::new("a@b.com", "x")).await.unwrap_err();
        assert!(matches!(err, HelpdeskError::Configuration(_)));
        assert!(!err.is_retryable());
    }
}
