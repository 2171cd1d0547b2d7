use helpdesk_core::error::{HelpdeskError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static ANGLE_ADDRESS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<(.+?)>").ok());
static BARE_ADDRESS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(\S+@\S+)").ok());
static VALID_ADDRESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").ok());

/// Fields posted by the inbound-parse webhook. Missing fields are empty / zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InboundEmail {
    pub dkim: String,
    pub spf: String,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
    pub envelope: String,
    pub attachments: u32,
}

/// An inbound email that passed sender authentication and carries a usable address.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedEmail {
    pub sender: String,
    pub email: InboundEmail,
}

impl InboundEmail {
    pub fn from_form(fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).cloned().unwrap_or_default();
        Self {
            dkim: field("dkim"),
            spf: field("spf"),
            from: field("from"),
            to: field("to"),
            subject: field("subject"),
            text: field("text"),
            html: field("html"),
            envelope: field("envelope"),
            attachments: fields
                .get("attachments")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
        }
    }

    /// SPF pass, or a DKIM verdict that is present and not `none`/`fail`.
    pub fn is_secure(&self) -> bool {
        let dkim = self.dkim.trim();
        self.spf.trim() == "pass" || (!dkim.is_empty() && dkim != "none" && dkim != "fail")
    }

    pub fn sender_address(&self) -> String {
        extract_email_address(&self.from)
    }

    pub fn verify(self) -> Result<VerifiedEmail> {
        if !self.is_secure() {
            tracing::warn!(from = %self.from, spf = %self.spf, dkim = %self.dkim, "Rejected inbound email");
            return Err(HelpdeskError::Validation("Falha na validação de segurança".into()));
        }

        let sender = self.sender_address();
        if !is_valid_address(&sender) {
            return Err(HelpdeskError::Validation("E-mail do remetente inválido".into()));
        }

        Ok(VerifiedEmail { sender, email: self })
    }
}

/// Bare address from `Name <addr>` or the first `x@y` token. Anything else is
/// returned unchanged.
pub fn extract_email_address(raw: &str) -> String {
    [&*ANGLE_ADDRESS, &*BARE_ADDRESS]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(raw).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| raw.to_string())
}

pub fn is_valid_address(address: &str) -> bool {
    VALID_ADDRESS.as_ref().map_or(false, |re| re.is_match(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(spf: &str, dkim: &str) -> InboundEmail {
        InboundEmail {
            spf: spf.into(),
            dkim: dkim.into(),
            from: "Jane Doe <jane@x.com>".into(),
            ..Default::default()
        }
    }

    #[test]
    fn form_fields_default_when_missing() {
        let mut fields = HashMap::new();
        fields.insert("from".to_string(), "jane@x.com".to_string());
        fields.insert("attachments".to_string(), "two".to_string());
        let parsed = InboundEmail::from_form(&fields);
        assert_eq!(parsed.from, "jane@x.com");
        assert_eq!(parsed.subject, "");
        assert_eq!(parsed.attachments, 0);
    }

    #[test]
    fn spf_pass_is_enough() {
        assert!(email("pass", "fail").is_secure());
        assert!(email("pass", "").is_secure());
    }

    #[test]
    fn dkim_verdict_alone_can_accept() {
        assert!(email("fail", "{@x.com : pass}").is_secure());
        assert!(!email("fail", "fail").is_secure());
        assert!(!email("softfail", "none").is_secure());
        assert!(!email("", "").is_secure());
    }

    #[test]
    fn address_extraction() {
        assert_eq!(extract_email_address("Jane <jane@x.com>"), "jane@x.com");
        assert_eq!(extract_email_address("<jane@x.com>"), "jane@x.com");
        assert_eq!(extract_email_address("reply from jane@x.com today"), "jane@x.com");
        assert_eq!(extract_email_address("not an address"), "not an address");
    }

    #[test]
    fn verify_rejects_insecure_and_addressless_mail() {
        assert!(matches!(email("fail", "fail").verify(), Err(HelpdeskError::Validation(_))));

        let mut bad_sender = email("pass", "");
        bad_sender.from = "Jane Doe".into();
        assert!(matches!(bad_sender.verify(), Err(HelpdeskError::Validation(_))));

        let ok = email("pass", "").verify().unwrap();
        assert_eq!(ok.sender, "jane@x.com");
    }
}
