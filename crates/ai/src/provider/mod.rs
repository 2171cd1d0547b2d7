use async_trait::async_trait;
use helpdesk_core::error::{HelpdeskError, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse>;
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;
    async fn list_models(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    // Optional: some providers need model explicitly in request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponseFormat {
    #[serde(rename = "json_object")]
    Json,
    #[serde(rename = "text")]
    Text,
}

/// Why the model stopped producing tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

impl FinishReason {
    pub fn from_provider(reason: Option<&str>) -> Self {
        match reason {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

fn ai_err(e: reqwest::Error) -> HelpdeskError {
    HelpdeskError::AI(e.to_string())
}

/// Reads a JSON body, turning non-2xx replies into an `AI` error carrying the body.
async fn read_json(response: reqwest::Response) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HelpdeskError::AI(format!("Provider returned {}: {}", status, body)));
    }
    response.json().await.map_err(ai_err)
}

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    model_name: Option<String>,
    embedding_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, model_name: Option<String>, embedding_model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model_name,
            embedding_model: embedding_model.unwrap_or_else(|| "all-minilm".to_string()),
        }
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(ai_err)?;
        let body = read_json(response).await?;

        let models = body["models"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_else(Vec::new);

        Ok(models)
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);

        let model = request
            .model
            .or(self.model_name.clone())
            .unwrap_or_else(|| "llama3".to_string());

        let mut options = serde_json::json!({ "temperature": request.temperature });
        if let Some(max_tokens) = request.max_tokens {
            options["num_predict"] = max_tokens.into();
        }

        let ollama_req = serde_json::json!({
            "model": model,
            "messages": request.messages,
            "stream": false,
            "options": options,
            "format": match request.response_format {
                Some(ResponseFormat::Json) => "json",
                _ => "",
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&ollama_req)
            .send()
            .await
            .map_err(ai_err)?;
        let body = read_json(response).await?;

        let content = body["message"]["content"]
            .as_str()
            .ok_or_else(|| HelpdeskError::AI("Invalid Ollama response".into()))?
            .to_string();

        let usage = Usage {
            prompt_tokens: body["prompt_eval_count"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["eval_count"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ChatResponse {
            content,
            finish_reason: FinishReason::from_provider(body["done_reason"].as_str()),
            usage,
        })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let req = serde_json::json!({
            "model": self.embedding_model,
            "prompt": text
        });

        let response = self
            .client
            .post(&url)
            .json(&req)
            .send()
            .await
            .map_err(ai_err)?;
        let body = read_json(response).await?;

        serde_json::from_value(body["embedding"].clone()).map_err(|e| HelpdeskError::AI(e.to_string()))
    }
}

pub struct OpenAICompatibleProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model_name: Option<String>,
    embedding_model: String,
}

impl OpenAICompatibleProvider {
    pub fn new(
        base_url: String,
        api_key: Option<SecretString>,
        model_name: Option<String>,
        embedding_model: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model_name,
            embedding_model: embedding_model.unwrap_or_else(|| "text-embedding-ada-002".to_string()),
        }
    }

    /// The hosted OpenAI API refuses unauthenticated calls; local
    /// OpenAI-compatible servers usually accept them.
    fn requires_key(&self) -> bool {
        self.base_url.contains("api.openai.com")
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.api_key {
            Some(key) => Ok(builder.bearer_auth(key.expose_secret())),
            None if self.requires_key() => Err(HelpdeskError::Configuration(
                "OPENAI_API_KEY is not configured".into(),
            )),
            None => Ok(builder),
        }
    }
}

#[async_trait]
impl AiProvider for OpenAICompatibleProvider {
    async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let builder = self.authorize(self.client.get(&url))?;

        let response = builder.send().await.map_err(ai_err)?;
        let body = read_json(response).await?;

        let models = body["data"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| m["id"].as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_else(Vec::new);

        Ok(models)
    }

    async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let builder = self.authorize(self.client.post(&url))?;

        let mut req_json =
            serde_json::to_value(&request).map_err(|e| HelpdeskError::Internal(e.to_string()))?;
        if let Some(obj) = req_json.as_object_mut() {
            // Inject model if missing and configured
            if !obj.contains_key("model") {
                if let Some(m) = &self.model_name {
                    obj.insert("model".to_string(), serde_json::Value::String(m.clone()));
                }
            }
        }
        debug!(url = %url, "Sending chat completion");

        let response = builder.json(&req_json).send().await.map_err(ai_err)?;
        let body = read_json(response).await?;

        let choice = &body["choices"][0];
        let content = choice["message"]["content"]
            .as_str()
            .ok_or_else(|| HelpdeskError::AI("Invalid AI response format".into()))?
            .to_string();

        let usage = Usage {
            prompt_tokens: body["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: body["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(ChatResponse {
            content,
            finish_reason: FinishReason::from_provider(choice["finish_reason"].as_str()),
            usage,
        })
    }

    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);
        let builder = self.authorize(self.client.post(&url))?;

        let response = builder
            .json(&serde_json::json!({
                "input": text,
                "model": self.embedding_model
            }))
            .send()
            .await
            .map_err(ai_err)?;
        let body = read_json(response).await?;

        serde_json::from_value(body["data"][0]["embedding"].clone())
            .map_err(|e| HelpdeskError::AI(e.to_string()))
    }
}
