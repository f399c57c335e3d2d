use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::embed::EmbeddingProvider;
use crate::error::{Error, Result};
use crate::generate::TextGenerator;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn client(&self) -> Result<Client> {
        Ok(Client::builder().timeout(self.request_timeout).build()?)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingProvider {
    client: Client,
    config: ApiConfig,
    model: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: ApiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            config,
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = self
            .client
            .post(self.config.endpoint("embeddings"))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: text,
            });

        let response: EmbeddingResponse = self
            .config
            .authorize(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Embedding("response contained no embedding".to_string()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiTextGenerator {
    client: Client,
    config: ApiConfig,
    model: String,
}

impl OpenAiTextGenerator {
    pub fn new(config: ApiConfig, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: config.client()?,
            config,
            model: model.into(),
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .json(&ChatRequest {
                model: &self.model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            });

        let response: ChatResponse = self
            .config
            .authorize(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| Error::Generation("response contained no message".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config = ApiConfig {
            api_base: "http://localhost:8080/v1/".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(
            config.endpoint("embeddings"),
            "http://localhost:8080/v1/embeddings"
        );
    }

    #[test]
    fn parses_embedding_response() {
        let body = r#"{"object":"list","data":[{"index":0,"embedding":[0.1,0.2]}],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.1, 0.2]);
    }

    #[test]
    fn parses_chat_response() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":" Hi "}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some(" Hi "));
    }

    #[tokio::test]
    async fn unreachable_backend_is_an_error() {
        let config = ApiConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            api_key: None,
            request_timeout: Duration::from_millis(500),
        };
        let embedder = OpenAiEmbeddingProvider::new(config, DEFAULT_EMBEDDING_MODEL).unwrap();
        assert!(embedder.embed("hello").await.is_err());
    }
}
