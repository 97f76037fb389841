use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::{InlineImage, Oracle};
use crate::config::OracleConfig;
use crate::error::OracleError;

/// Gemini `generateContent` over blocking HTTP.
pub struct GeminiOracle {
    client: Client,
    api_key: String,
    base_url: String,
    vision_model: String,
    text_model: String,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiOracle {
    /// Builds the HTTP client. Must not be called from inside an async
    /// runtime; the blocking client owns its own.
    pub fn new(config: &OracleConfig, api_key: &str) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            vision_model: config.vision_model.clone(),
            text_model: config.text_model.clone(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }

    fn generate(&self, model: &str, parts: Vec<Part<'_>>) -> Result<String, OracleError> {
        let request = GenerateContentRequest {
            contents: vec![Content { parts }],
        };

        let response = self
            .client
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                message: truncate(&message, 300),
            });
        }

        let body: GenerateContentResponse = response.json()?;
        extract_text(&body)
    }
}

impl Oracle for GeminiOracle {
    fn describe_image(&self, prompt: &str, image: InlineImage<'_>) -> Result<String, OracleError> {
        tracing::debug!(model = %self.vision_model, bytes = image.bytes.len(), "vision request");
        let parts = vec![
            Part::Text { text: prompt },
            Part::Inline {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: STANDARD.encode(image.bytes),
                },
            },
        ];
        self.generate(&self.vision_model, parts)
    }

    fn generate_text(&self, prompt: &str) -> Result<String, OracleError> {
        tracing::debug!(model = %self.text_model, "text request");
        self.generate(&self.text_model, vec![Part::Text { text: prompt }])
    }
}

/// Joins the text parts of the first candidate.
fn extract_text(body: &GenerateContentResponse) -> Result<String, OracleError> {
    let text = body
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|candidate| candidate.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OracleError::EmptyResponse);
    }
    Ok(text)
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}
