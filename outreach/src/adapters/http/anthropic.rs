//! Message generation through the Anthropic Messages API.

use super::{check_reachable, send_json};
use crate::adapters::{ClientInfo, MessageGenerator};
use crate::core::{Lead, StageResult};
use crate::errors::FailureKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Builds the outreach prompt for one lead.
#[must_use]
pub fn build_prompt(lead: &Lead, client: &ClientInfo, offer: &str) -> String {
    format!(
        "You are an expert sales agent specializing in personalized outreach. \
         Write a compelling, personalized cold outreach email to {name} at {company}.\n\n\
         Context:\n\
         - You represent {client}\n\
         - Your offer: {offer}\n\
         - Target: {name} at {company}\n\n\
         Requirements:\n\
         - Make the message friendly, concise, and highly personalized\n\
         - Reference specific aspects of {company} that make them a good fit\n\
         - Avoid generic language, be specific and relevant\n\
         - Include a clear, compelling call to action\n\
         - Keep the tone professional but approachable\n\
         - Maximum 150 words\n\n\
         Generate the email body only (no subject line):",
        name = lead.name,
        company = lead.company,
        client = client.name,
    )
}

/// Writes outreach messages with a Claude model.
#[derive(Clone)]
pub struct AnthropicMessageGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicMessageGenerator {
    /// Creates a generator using the default model.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Overrides the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Points the generator at a different API root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, body: &MessagesRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
    }
}

impl std::fmt::Debug for AnthropicMessageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicMessageGenerator")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn first_text(response: MessagesResponse) -> StageResult<String> {
    let text = response
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .map(|block| block.text.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        return StageResult::permanent(FailureKind::Internal, "model returned no text");
    }
    StageResult::Success(text)
}

#[async_trait]
impl MessageGenerator for AnthropicMessageGenerator {
    async fn generate(&self, lead: &Lead, client: &ClientInfo, offer: &str) -> StageResult<String> {
        let prompt = build_prompt(lead, client, offer);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            temperature: Some(TEMPERATURE),
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };
        debug!(lead_id = %lead.id, model = %self.model, "Requesting outreach message");
        match send_json(self.request(&body)).await {
            StageResult::Success(response) => first_text(response),
            StageResult::RetryableFailure(f) => StageResult::RetryableFailure(f),
            StageResult::PermanentFailure(f) => StageResult::PermanentFailure(f),
        }
    }

    async fn test_connection(&self) -> bool {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: 10,
            temperature: None,
            messages: vec![ChatMessage {
                role: "user",
                content: "Hello",
            }],
        };
        check_reachable(self.request(&body)).await
    }
}
