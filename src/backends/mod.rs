use anyhow::{Context, Result, anyhow};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

mod claude;
mod gemini;
mod google;
mod openai;

pub use claude::Claude;
pub use gemini::Gemini;
pub use google::GoogleWeb;
pub use openai::OpenAI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Google,
    OpenAI,
    Claude,
    Gemini,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Google,
        BackendKind::OpenAI,
        BackendKind::Claude,
        BackendKind::Gemini,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Google => "google",
            BackendKind::OpenAI => "openai",
            BackendKind::Claude => "claude",
            BackendKind::Gemini => "gemini",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "google" => Ok(BackendKind::Google),
            "openai" => Ok(BackendKind::OpenAI),
            "claude" | "anthropic" => Ok(BackendKind::Claude),
            "gemini" => Ok(BackendKind::Gemini),
            other => Err(anyhow!(
                "unknown backend '{}' (expected one of: {})",
                other,
                BackendKind::ALL
                    .iter()
                    .map(BackendKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }

    fn needs_key(&self) -> bool {
        !matches!(self, BackendKind::Google)
    }
}

/// Client settings shared by every backend a worker builds.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub host: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<Duration>,
    pub model: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

pub type BackendFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

pub trait Backend {
    fn name(&self) -> &'static str;
    fn translate(&self, request: TranslationRequest) -> BackendFuture;
}

#[derive(Debug, Clone)]
pub enum BackendImpl {
    Google(GoogleWeb),
    OpenAI(OpenAI),
    Claude(Claude),
    Gemini(Gemini),
}

impl Backend for BackendImpl {
    fn name(&self) -> &'static str {
        match self {
            BackendImpl::Google(backend) => backend.name(),
            BackendImpl::OpenAI(backend) => backend.name(),
            BackendImpl::Claude(backend) => backend.name(),
            BackendImpl::Gemini(backend) => backend.name(),
        }
    }

    fn translate(&self, request: TranslationRequest) -> BackendFuture {
        match self {
            BackendImpl::Google(backend) => backend.translate(request),
            BackendImpl::OpenAI(backend) => backend.translate(request),
            BackendImpl::Claude(backend) => backend.translate(request),
            BackendImpl::Gemini(backend) => backend.translate(request),
        }
    }
}

/// Everything needed to build a backend client; each worker builds its own.
#[derive(Debug, Clone)]
pub struct BackendSpec {
    pub kind: BackendKind,
    pub options: BackendOptions,
}

impl BackendSpec {
    pub fn new(kind: BackendKind, options: BackendOptions) -> Self {
        Self { kind, options }
    }

    /// Checks key and proxy up front so a bad setup fails before any file
    /// is touched.
    pub fn validate(&self) -> Result<()> {
        if let Some(proxy) = self.options.proxy.as_deref() {
            reqwest::Proxy::all(normalize_proxy(proxy))
                .with_context(|| format!("invalid proxy '{}'", proxy))?;
        }
        if self.kind.needs_key() {
            resolve_key(self.kind, self.options.key.as_deref())?;
        }
        Ok(())
    }

    pub fn build(&self) -> Result<BackendImpl> {
        let client = http_client(&self.options)?;
        let host = self.options.host.as_deref();
        let model = self.options.model.clone().unwrap_or_default();
        let backend = match self.kind {
            BackendKind::Google => BackendImpl::Google(GoogleWeb::new(client, host)),
            BackendKind::OpenAI => {
                let key = resolve_key(self.kind, self.options.key.as_deref())?;
                BackendImpl::OpenAI(OpenAI::new(client, key, host).with_model(model))
            }
            BackendKind::Claude => {
                let key = resolve_key(self.kind, self.options.key.as_deref())?;
                BackendImpl::Claude(Claude::new(client, key, host).with_model(model))
            }
            BackendKind::Gemini => {
                let key = resolve_key(self.kind, self.options.key.as_deref())?;
                BackendImpl::Gemini(Gemini::new(client, key, host).with_model(model))
            }
        };
        Ok(backend)
    }
}

pub fn resolve_key(kind: BackendKind, override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key.filter(|key| !key.trim().is_empty()) {
        return Ok(key.to_string());
    }

    match kind {
        BackendKind::Google => Some(String::new()),
        BackendKind::OpenAI => get_env("OPENAI_API_KEY"),
        BackendKind::Claude => get_env("ANTHROPIC_API_KEY"),
        BackendKind::Gemini => get_env("GEMINI_API_KEY").or_else(|| get_env("GOOGLE_API_KEY")),
    }
    .ok_or_else(|| anyhow!("API key not found for backend {}", kind.as_str()))
}

fn http_client(options: &BackendOptions) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = options.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(proxy) = options.proxy.as_deref() {
        let proxy = reqwest::Proxy::all(normalize_proxy(proxy))
            .with_context(|| format!("invalid proxy '{}'", proxy))?;
        builder = builder.proxy(proxy);
    }
    builder.build().with_context(|| "failed to build HTTP client")
}

/// `host:port` proxies are taken as plain HTTP proxies.
pub(crate) fn normalize_proxy(proxy: &str) -> String {
    let proxy = proxy.trim();
    if proxy.contains("://") {
        proxy.to_string()
    } else {
        format!("http://{}", proxy)
    }
}

/// A host override may be a bare host name or a full base URL.
pub(crate) fn base_url(host: Option<&str>, default_host: &str) -> String {
    let host = host
        .map(str::trim)
        .filter(|host| !host.is_empty())
        .unwrap_or(default_host);
    if host.contains("://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", host.trim_end_matches('/'))
    }
}

pub(crate) fn system_prompt(request: &TranslationRequest) -> String {
    let source = if request.source_lang.trim().eq_ignore_ascii_case("auto") {
        "the language it is written in".to_string()
    } else {
        format!("language code '{}'", request.source_lang)
    };
    format!(
        "You are a translation engine. Translate the user's text from {} into language code '{}'. \
         Reply with the translation only, without notes, quotes or explanations. \
         The text contains placeholder tokens such as 【T0】 or 【T12】: copy every token unchanged \
         and keep it where it belongs in the translated sentence.",
        source, request.target_lang
    )
}

pub(crate) fn format_error_parts(
    message: Option<String>,
    kind: Option<String>,
    code: Option<String>,
) -> String {
    let mut parts = Vec::new();
    if let Some(message) = message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(kind) = kind
        && !kind.trim().is_empty()
    {
        parts.push(format!("type: {}", kind));
    }
    if let Some(code) = code
        && !code.trim().is_empty()
    {
        parts.push(format!("code: {}", code));
    }
    if parts.is_empty() {
        "unknown error".to_string()
    } else {
        parts.join(" | ")
    }
}

fn get_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
