use crate::provider::{AiProvider, ChatRequest, ChatResponse, FinishReason, Message};
use helpdesk_core::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "Você é um assistente de suporte ao cliente especializado e prestativo. Suas responsabilidades incluem:

1. Responder dúvidas de clientes de forma clara e profissional
2. Usar informações da base de conhecimento quando disponível
3. Manter um tom cordial e empático
4. Fornecer soluções práticas e específicas
5. Solicitar mais informações quando necessário

Diretrizes:
- Sempre cumprimente o cliente respeitosamente
- Use as informações da base de conhecimento quando relevante
- Se não souber a resposta, seja honesto e ofereça alternativas
- Mantenha as respostas concisas mas completas
- Finalize oferecendo ajuda adicional
- Responda no idioma usado pelo cliente
- Evite jargões técnicos desnecessários";

#[derive(Debug, Clone, Default)]
pub struct TicketContext {
    pub subject: String,
    pub previous_messages: Vec<String>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub title: String,
    pub content: String,
    pub relevance: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeContext {
    pub documents: Vec<KnowledgeSnippet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub content: String,
    pub confidence: f32,
    pub used_knowledge_base: bool,
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub chat_model: Option<String>,
    pub summary_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            chat_model: None,
            summary_model: None,
            temperature: 0.7,
            max_tokens: 1000,
        }
    }
}

/// Drafts support replies from ticket context and retrieved knowledge.
pub struct ResponseGenerator {
    ai: Arc<dyn AiProvider>,
    options: GeneratorOptions,
}

impl ResponseGenerator {
    pub fn new(ai: Arc<dyn AiProvider>, options: GeneratorOptions) -> Self {
        Self { ai, options }
    }

    pub async fn generate_response(
        &self,
        customer_message: &str,
        ticket: &TicketContext,
        knowledge: Option<&KnowledgeContext>,
    ) -> Result<AiResponse> {
        let request = ChatRequest {
            messages: vec![
                Message::system(SYSTEM_PROMPT),
                Message::user(build_user_prompt(customer_message, ticket, knowledge)),
            ],
            temperature: self.options.temperature,
            max_tokens: Some(self.options.max_tokens),
            response_format: None,
            model: self.options.chat_model.clone(),
        };

        let response = self
            .ai
            .chat_completion(request)
            .await
            .context("generate response")?;
        debug!(
            finish_reason = ?response.finish_reason,
            completion_tokens = response.usage.completion_tokens,
            "Generated reply"
        );

        Ok(AiResponse {
            confidence: confidence(&response),
            used_knowledge_base: knowledge.map_or(false, |k| !k.documents.is_empty()),
            content: response.content,
        })
    }

    /// Never fails: falls back to truncating `text` to `max_length` characters.
    pub async fn summarize_text(&self, text: &str, max_length: usize) -> String {
        let request = ChatRequest {
            messages: vec![
                Message::system(format!(
                    "Resuma o texto a seguir em no máximo {} caracteres, mantendo as informações mais importantes.",
                    max_length
                )),
                Message::user(text),
            ],
            temperature: 0.3,
            max_tokens: Some(max_length.div_ceil(2) as u32),
            response_format: None,
            model: self.options.summary_model.clone(),
        };

        match self.ai.chat_completion(request).await {
            Ok(response) if !response.content.is_empty() => response.content,
            Ok(_) => truncate_chars(text, max_length),
            Err(e) => {
                warn!("Summarization failed, truncating instead: {}", e);
                truncate_chars(text, max_length)
            }
        }
    }
}

pub fn build_system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

pub fn build_user_prompt(customer_message: &str, ticket: &TicketContext, knowledge: Option<&KnowledgeContext>) -> String {
    let mut prompt = format!("CONTEXTO DO TICKET:\nAssunto: {}\n", ticket.subject);
    if let Some(name) = &ticket.customer_name {
        prompt.push_str(&format!("Cliente: {}\n", name));
    }
    prompt.push('\n');

    if !ticket.previous_messages.is_empty() {
        prompt.push_str("HISTÓRICO DA CONVERSA:\n");
        prompt.push_str(&ticket.previous_messages.join("\n---\n"));
        prompt.push_str("\n\n");
    }

    if let Some(knowledge) = knowledge.filter(|k| !k.documents.is_empty()) {
        let snippets: Vec<String> = knowledge
            .documents
            .iter()
            .map(|doc| format!("[Relevância: {:.2}] {}\n{}", doc.relevance, doc.title, doc.content))
            .collect();
        prompt.push_str("INFORMAÇÕES DA BASE DE CONHECIMENTO:\n");
        prompt.push_str(&snippets.join("\n\n---\n\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str("MENSAGEM ATUAL DO CLIENTE:\n");
    prompt.push_str(customer_message);
    prompt.push_str("\n\nPor favor, gere uma resposta adequada para o cliente.");
    prompt
}

pub fn confidence(response: &ChatResponse) -> f32 {
    if response.content.is_empty() {
        return 0.0;
    }
    match response.finish_reason {
        FinishReason::Stop => 0.9,
        FinishReason::Length => 0.7,
        _ => 0.5,
    }
}

fn truncate_chars(text: &str, max_length: usize) -> String {
    text.chars().take(max_length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Usage;
    use async_trait::async_trait;
    use helpdesk_core::error::HelpdeskError;
    use std::sync::Mutex;

    struct ScriptedProvider {
        reply: Option<(String, FinishReason)>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Some((content, finish_reason)) => Ok(ChatResponse {
                    content: content.clone(),
                    finish_reason: *finish_reason,
                    usage: Usage::default(),
                }),
                None => Err(HelpdeskError::AI("rate limited".into())),
            }
        }

        async fn generate_embedding(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    fn generator(reply: Option<(&str, FinishReason)>) -> (Arc<ScriptedProvider>, ResponseGenerator) {
        let provider = Arc::new(ScriptedProvider {
            reply: reply.map(|(c, f)| (c.to_string(), f)),
            seen: Mutex::new(Vec::new()),
        });
        let generator = ResponseGenerator::new(provider.clone(), GeneratorOptions::default());
        (provider, generator)
    }

    fn response(content: &str, finish_reason: FinishReason) -> ChatResponse {
        ChatResponse {
            content: content.into(),
            finish_reason,
            usage: Usage::default(),
        }
    }

    #[test]
    fn confidence_follows_finish_reason() {
        assert_eq!(confidence(&response("", FinishReason::Stop)), 0.0);
        assert_eq!(confidence(&response("ok", FinishReason::Stop)), 0.9);
        assert_eq!(confidence(&response("ok", FinishReason::Length)), 0.7);
        assert_eq!(confidence(&response("ok", FinishReason::ContentFilter)), 0.5);
    }

    #[test]
    fn user_prompt_includes_history_and_ranked_knowledge() {
        let ticket = TicketContext {
            subject: "Cannot log in".into(),
            previous_messages: vec!["first".into(), "second".into()],
            customer_name: Some("Jane".into()),
        };
        let knowledge = KnowledgeContext {
            documents: vec![KnowledgeSnippet {
                title: "Password reset".into(),
                content: "Use the forgot password link.".into(),
                relevance: 0.8765,
            }],
        };
        let prompt = build_user_prompt("I forgot my password", &ticket, Some(&knowledge));

        assert!(prompt.contains("Assunto: Cannot log in"));
        assert!(prompt.contains("Cliente: Jane"));
        assert!(prompt.contains("first\n---\nsecond"));
        assert!(prompt.contains("[Relevância: 0.88] Password reset"));
        assert!(prompt.trim_end().ends_with("Por favor, gere uma resposta adequada para o cliente."));
    }

    #[test]
    fn user_prompt_skips_empty_sections() {
        let prompt = build_user_prompt("hi", &TicketContext::default(), Some(&KnowledgeContext::default()));
        assert!(!prompt.contains("HISTÓRICO"));
        assert!(!prompt.contains("BASE DE CONHECIMENTO"));
        assert!(!prompt.contains("Cliente:"));
    }

    #[tokio::test]
    async fn generate_response_sends_bounded_request() {
        let (provider, generator) = generator(Some(("Olá Jane", FinishReason::Stop)));
        let knowledge = KnowledgeContext {
            documents: vec![KnowledgeSnippet {
                title: "t".into(),
                content: "c".into(),
                relevance: 0.5,
            }],
        };

        let reply = generator
            .generate_response("help", &TicketContext::default(), Some(&knowledge))
            .await
            .unwrap();
        assert_eq!(reply.content, "Olá Jane");
        assert_eq!(reply.confidence, 0.9);
        assert!(reply.used_knowledge_base);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].max_tokens, Some(1000));
        assert_eq!(seen[0].messages[0].content, build_system_prompt());
    }

    #[tokio::test]
    async fn generate_response_wraps_provider_errors() {
        let (_, generator) = generator(None);
        let err = generator
            .generate_response("help", &TicketContext::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("generate response failed"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn summarize_falls_back_to_char_safe_truncation() {
        let (provider, generator) = generator(None);
        let summary = generator.summarize_text("ação rápida e eficiente", 4).await;
        assert_eq!(summary, "ação");
        assert_eq!(provider.seen.lock().unwrap()[0].max_tokens, Some(2));
    }
}
