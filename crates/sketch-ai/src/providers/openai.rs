//! OpenAI Chat Completions and Embeddings API client

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    types::{Context, EmbeddingModel, Message, Model},
};

/// OpenAI API client
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| Error::InvalidApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Request a completion constrained to a named JSON schema and return the
    /// parsed object from the first choice.
    pub async fn complete_structured(
        &self,
        model: &Model,
        context: &Context,
        schema_name: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let request = build_request(model, context, schema_name, schema);
        let url = format!("{}/chat/completions", model.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let completion: ChatResponse = response.json().await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::UnexpectedResponse("completion had no choices".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            Error::UnexpectedResponse(format!("structured output was not valid JSON: {}", e))
        })
    }

    /// Embed a single text into the model's vector space.
    pub async fn embed(&self, model: &EmbeddingModel, input: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: model.id.clone(),
            input: input.to_string(),
        };
        let url = format!("{}/embeddings", model.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: EmbeddingResponse = response.json().await?;

        body.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::UnexpectedResponse("embedding response had no data".to_string()))
    }
}

/// Map non-2xx responses to typed errors, passing 2xx through.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let text = response.text().await.unwrap_or_default();
    let (error_type, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => (body.error.error_type.unwrap_or_default(), body.error.message),
        Err(_) => ("http_error".to_string(), text),
    };

    match status.as_u16() {
        401 | 403 => Err(Error::Auth(message)),
        429 => Err(Error::RateLimited { retry_after }),
        _ => Err(Error::api(error_type, message)),
    }
}

fn build_request(
    model: &Model,
    context: &Context,
    schema_name: &str,
    schema: &serde_json::Value,
) -> ChatRequest {
    let mut messages = Vec::new();

    if let Some(ref system_prompt) = context.system_prompt {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system_prompt.clone(),
        });
    }

    for msg in &context.messages {
        messages.push(ChatMessage {
            role: msg.role().to_string(),
            content: msg.text().to_string(),
        });
    }

    ChatRequest {
        model: model.id.clone(),
        messages,
        temperature: Some(1.0),
        response_format: ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchemaFormat {
                name: schema_name.to_string(),
                strict: true,
                schema: schema.clone(),
            },
        },
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}
