use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::ApiError;
use crate::models::{Categorization, SearchAnswer, Source};

/// The external language-model API.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn categorize(&self, command: &str) -> Result<Categorization, ApiError>;

    async fn search(&self, query: &str) -> Result<SearchAnswer, ApiError>;
}

// Gemini generateContent client
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(client: reqwest::Client, base_url: String, model: String, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    async fn generate(&self, body: Value) -> Result<GenerateContentResponse, ApiError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ApiError::InternalError("Gemini API key not configured".into()));
        };

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<GenerateContentResponse>().await?)
    }
}

fn categorize_body(command: &str) -> Value {
    json!({
        "contents": [{
            "parts": [{
                "text": format!(
                    "Process this command: \"{command}\". Categorize it into a structured notebook item. Output should be JSON."
                )
            }]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": {
                "type": "OBJECT",
                "properties": {
                    "title": {
                        "type": "STRING",
                        "description": "Short title for the note (max 100 chars)"
                    },
                    "type": {
                        "type": "STRING",
                        "enum": ["NOTE", "ARTICLE", "PHOTOGRAPH", "VIDEO", "LINK"],
                        "description": "The type of content"
                    },
                    "icon": {
                        "type": "STRING",
                        "description": "A Google Material Symbol name fitting the content (e.g., description, image, article, play_circle, link)"
                    },
                    "iconColor": {
                        "type": "STRING",
                        "description": "Tailwind color class (e.g., text-red-500, text-blue-400) or empty string"
                    }
                },
                "required": ["title", "type", "icon"]
            }
        }
    })
}

fn search_body(query: &str) -> Value {
    json!({
        "contents": [{ "parts": [{ "text": query }] }],
        "tools": [{ "googleSearch": {} }]
    })
}

#[async_trait]
impl Assistant for GeminiClient {
    async fn categorize(&self, command: &str) -> Result<Categorization, ApiError> {
        let response = self.generate(categorize_body(command)).await?;
        parse_categorization(&response.text())
    }

    async fn search(&self, query: &str) -> Result<SearchAnswer, ApiError> {
        let response = self.generate(search_body(query)).await?;
        Ok(SearchAnswer {
            text: response.text(),
            sources: response.sources(),
        })
    }
}

fn parse_categorization(text: &str) -> Result<Categorization, ApiError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::InternalError("Empty response from AI".into()));
    }

    let mut result: Categorization = serde_json::from_str(text).map_err(|e| {
        tracing::warn!(error = %e, "unparseable categorization");
        ApiError::InternalError("AI categorization failed".into())
    })?;
    // the model answers "" when it has no color in mind
    if result.icon_color.as_deref().is_some_and(str::is_empty) {
        result.icon_color = None;
    }
    Ok(result)
}

// Gemini API response format (only the fields we read)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    web: Option<WebChunk>,
}

#[derive(Debug, Deserialize)]
struct WebChunk {
    title: Option<String>,
    uri: Option<String>,
}

impl GenerateContentResponse {
    fn first(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    fn text(&self) -> String {
        self.first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn sources(&self) -> Vec<Source> {
        self.first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|meta| {
                meta.grounding_chunks
                    .iter()
                    .map(|chunk| {
                        let web = chunk.web.as_ref();
                        Source {
                            title: web
                                .and_then(|w| w.title.clone())
                                .unwrap_or_else(|| "Source".to_string()),
                            uri: web
                                .and_then(|w| w.uri.clone())
                                .unwrap_or_else(|| "#".to_string()),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
