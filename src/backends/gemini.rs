use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{Backend, BackendFuture, TranslationRequest, base_url, format_error_parts, system_prompt};

const DEFAULT_HOST: &str = "generativelanguage.googleapis.com";
pub(crate) const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
}

impl Gemini {
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

impl Backend for Gemini {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let client = self.client.clone();
        let key = self.key.clone();
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        Box::pin(async move {
            let body = json!({
                "systemInstruction": {"parts": [{"text": system_prompt(&request)}]},
                "contents": [
                    {"role": "user", "parts": [{"text": request.text}]}
                ]
            });

            let response = client
                .post(&url)
                .header("x-goog-api-key", key)
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&text);
            }
            Err(anyhow!(
                "Gemini API error ({}): {}",
                status,
                extract_gemini_error(&text).unwrap_or(text)
            ))
        })
    }
}

fn extract_translation(text: &str) -> Result<String> {
    let payload: GeminiResponse =
        serde_json::from_str(text).with_context(|| "failed to parse Gemini response JSON")?;
    let content = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| anyhow!("no candidate returned from Gemini"))?;
    Ok(content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<String>())
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
        code: Option<i32>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(
        error.message,
        error.status,
        error.code.map(|value| value.to_string()),
    ))
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_candidate_parts() {
        let payload = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "你好"}, {"text": "，世界"}]}}
            ],
            "modelVersion": "gemini-2.5-flash"
        }"#;
        assert_eq!(extract_translation(payload).unwrap(), "你好，世界");
    }

    #[test]
    fn empty_candidates_is_an_error() {
        assert!(extract_translation(r#"{"candidates": []}"#).is_err());
    }

    #[test]
    fn formats_error_body() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            extract_gemini_error(body).unwrap(),
            "Quota exceeded | type: RESOURCE_EXHAUSTED | code: 429"
        );
    }
}
