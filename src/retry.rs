use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::backends::{Backend, TranslationRequest};
use crate::masking::repair_placeholders;

pub const DEFAULT_RETRIES: usize = 10;
pub const DEFAULT_WAIT: Duration = Duration::from_millis(1500);
pub const DEFAULT_SOURCE_LANG: &str = "auto";
pub const DEFAULT_TARGET_LANG: &str = "zh-CN";

/// Per-call settings applied uniformly to every translation request.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslateOptions {
    pub source_lang: String,
    pub target_lang: String,
    pub retries: usize,
    pub wait: Duration,
}

impl Default for TranslateOptions {
    fn default() -> Self {
        Self {
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            retries: DEFAULT_RETRIES,
            wait: DEFAULT_WAIT,
        }
    }
}

impl TranslateOptions {
    fn request(&self, text: &str) -> TranslationRequest {
        TranslationRequest {
            text: text.to_string(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
        }
    }
}

#[derive(Debug)]
enum Attempt {
    Translated(String),
    Empty,
    Failed(anyhow::Error),
}

async fn attempt<B: Backend + ?Sized>(
    backend: &B,
    request: TranslationRequest,
) -> Attempt {
    match backend.translate(request).await {
        Ok(text) if text.trim().is_empty() => Attempt::Empty,
        Ok(text) => Attempt::Translated(text),
        Err(err) => Attempt::Failed(err),
    }
}

/// Calls the backend until it returns a non-empty translation, at most
/// `options.retries` times, sleeping `options.wait` after every call.
///
/// Returns `None` once the attempts are used up. Placeholder spellings in
/// the result are repaired before it is returned.
pub async fn translate_with_retry<B: Backend + ?Sized>(
    backend: &B,
    text: &str,
    options: &TranslateOptions,
) -> Option<String> {
    for attempt_no in 1..=options.retries {
        debug!("{} <- {}", backend.name(), text);
        let outcome = attempt(backend, options.request(text)).await;
        sleep(options.wait).await;
        match outcome {
            Attempt::Translated(translated) => {
                debug!("{} -> {}", backend.name(), translated);
                return Some(repair_placeholders(&translated));
            }
            Attempt::Empty => {
                warn!(
                    "{} returned an empty translation (attempt {}/{})",
                    backend.name(),
                    attempt_no,
                    options.retries
                );
            }
            Attempt::Failed(err) => {
                warn!(
                    "{} translation failed (attempt {}/{}): {:#}",
                    backend.name(),
                    attempt_no,
                    options.retries,
                    err
                );
            }
        }
    }
    warn!(
        "{} gave no translation after {} attempts",
        backend.name(),
        options.retries
    );
    None
}
