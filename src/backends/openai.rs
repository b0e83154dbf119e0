use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{Backend, BackendFuture, TranslationRequest, base_url, format_error_parts, system_prompt};

const DEFAULT_HOST: &str = "api.openai.com";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
}

impl OpenAI {
    pub fn new(client: reqwest::Client, key: impl Into<String>, host: Option<&str>) -> Self {
        Self {
            client,
            key: key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url(host, DEFAULT_HOST),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }
}

impl Backend for OpenAI {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let client = self.client.clone();
        let key = self.key.clone();
        let model = self.model.clone();
        let url = format!("{}/v1/chat/completions", self.base_url);
        Box::pin(async move {
            let body = json!({
                "model": model,
                "messages": [
                    {"role": "system", "content": system_prompt(&request)},
                    {"role": "user", "content": request.text}
                ]
            });

            let response = client.post(&url).bearer_auth(key).json(&body).send().await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&text);
            }
            Err(anyhow!(
                "OpenAI API error ({}): {}",
                status,
                extract_openai_error(&text).unwrap_or(text)
            ))
        })
    }
}

fn extract_translation(text: &str) -> Result<String> {
    let payload: OpenAIResponse =
        serde_json::from_str(text).with_context(|| "failed to parse OpenAI response JSON")?;
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("no message content returned from OpenAI"))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, error.code))
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}
