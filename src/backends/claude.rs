use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::json;

use super::{Backend, BackendFuture, TranslationRequest, base_url, format_error_parts, system_prompt};

const DEFAULT_HOST: &str = "api.anthropic.com";
pub(crate) const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct Claude {
    client: reqwest::Client,
    key: String,
    model: String,
    base_url: String,
}

impl Claude {
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

impl Backend for Claude {
    fn name(&self) -> &'static str {
        "claude"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let client = self.client.clone();
        let key = self.key.clone();
        let model = self.model.clone();
        let url = format!("{}/v1/messages", self.base_url);
        Box::pin(async move {
            let body = json!({
                "model": model,
                "max_tokens": MAX_TOKENS,
                "system": system_prompt(&request),
                "messages": [
                    {"role": "user", "content": [{"type": "text", "text": request.text}]}
                ]
            });

            let response = client
                .post(&url)
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01")
                .json(&body)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if status.is_success() {
                return extract_translation(&text);
            }
            Err(anyhow!(
                "Claude API error ({}): {}",
                status,
                extract_claude_error(&text).unwrap_or(text)
            ))
        })
    }
}

fn extract_translation(text: &str) -> Result<String> {
    let payload: ClaudeResponse =
        serde_json::from_str(text).with_context(|| "failed to parse Claude response JSON")?;
    let parts = payload
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect::<Vec<_>>();
    if parts.is_empty() {
        return Err(anyhow!("no text block returned from Claude"));
    }
    Ok(parts.concat())
}

fn extract_claude_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<ClaudeError>,
    }

    #[derive(Deserialize)]
    struct ClaudeError {
        #[serde(rename = "type")]
        kind: Option<String>,
        message: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    Some(format_error_parts(error.message, error.kind, None))
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ClaudeContent>,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks() {
        let payload = r#"{
            "id": "msg_1",
            "type": "message",
            "model": "claude-3-5-sonnet-latest",
            "content": [
                {"type": "text", "text": "第一章 【T0】 "},
                {"type": "text", "text": "开始"}
            ]
        }"#;
        assert_eq!(extract_translation(payload).unwrap(), "第一章 【T0】 开始");
    }

    #[test]
    fn formats_error_body() {
        let body = r#"{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}"#;
        assert_eq!(
            extract_claude_error(body).unwrap(),
            "Overloaded | type: overloaded_error"
        );
    }
}
