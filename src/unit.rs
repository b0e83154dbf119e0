use crate::backends::Backend;
use crate::masking::mask;
use crate::retry::{TranslateOptions, translate_with_retry};

/// What happened to one translatable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Translated(String),
    /// Empty, or nothing but markup; the backend was not called.
    NothingToTranslate,
    /// Every attempt failed or came back empty.
    Unavailable,
}

/// Masks `html`, translates it with retries, and restores the markup.
pub async fn translate_unit<B: Backend + ?Sized>(
    backend: &B,
    html: &str,
    options: &TranslateOptions,
) -> UnitOutcome {
    let fragment = mask(html);
    if !fragment.has_text() {
        return UnitOutcome::NothingToTranslate;
    }
    match translate_with_retry(backend, &fragment.text, options).await {
        Some(translated) => UnitOutcome::Translated(fragment.restore(&translated)),
        None => UnitOutcome::Unavailable,
    }
}
