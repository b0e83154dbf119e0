use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::{Backend, BackendFuture, TranslationRequest, base_url};

const DEFAULT_HOST: &str = "translate.googleapis.com";

/// The keyless web endpoint used by browser extensions.
#[derive(Debug, Clone)]
pub struct GoogleWeb {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleWeb {
    pub fn new(client: reqwest::Client, host: Option<&str>) -> Self {
        Self {
            client,
            base_url: base_url(host, DEFAULT_HOST),
        }
    }
}

impl Backend for GoogleWeb {
    fn name(&self) -> &'static str {
        "google"
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        let client = self.client.clone();
        let url = format!("{}/translate_a/single", self.base_url);
        Box::pin(async move {
            let response = client
                .post(&url)
                .query(&[
                    ("client", "gtx"),
                    ("sl", request.source_lang.as_str()),
                    ("tl", request.target_lang.as_str()),
                    ("dt", "t"),
                ])
                .form(&[("q", request.text.as_str())])
                .send()
                .await?;

            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(anyhow!("Google API error ({}): {}", status, text.trim()));
            }
            extract_translation(&text)
        })
    }
}

/// The payload is `[[["chunk", "source", ...], ...], ...]`; the first array
/// holds one entry per translated sentence.
fn extract_translation(text: &str) -> Result<String> {
    let payload: Value =
        serde_json::from_str(text).with_context(|| "failed to parse Google response JSON")?;
    let chunks = payload
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("no sentences returned from Google"))?;
    Ok(chunks
        .iter()
        .filter_map(|chunk| chunk.get(0).and_then(Value::as_str))
        .collect::<String>())
}
