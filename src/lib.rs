use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub mod backends;
pub mod batch;
mod dom;
pub mod logging;
pub mod masking;
pub mod preprocess;
pub mod retry;
pub mod settings;
pub mod unit;
pub mod walker;

#[cfg(test)]
mod test_util;

pub use backends::{Backend, BackendImpl, BackendKind, BackendOptions, BackendSpec};
pub use batch::{BatchReport, FileReport, FileStatus};
pub use masking::{MaskedFragment, Token, mask, repair_placeholders, restore};
pub use preprocess::Syntax;
pub use retry::{TranslateOptions, translate_with_retry};
pub use unit::{UnitOutcome, translate_unit};
pub use walker::{WalkReport, translate_html, translate_markup};

/// Command-line input; unset values fall back to settings files, then to
/// built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub backend: String,
    pub path: PathBuf,
    pub host: Option<String>,
    pub proxy: Option<String>,
    pub timeout: Option<f64>,
    pub threads: Option<usize>,
    pub wait_sec: Option<f64>,
    pub retry: Option<usize>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
}

/// Settings fixed at startup and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct Runtime {
    pub backend: BackendSpec,
    pub options: TranslateOptions,
    pub threads: usize,
}

pub async fn run(config: Config) -> Result<BatchReport> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;
    let runtime = resolve_runtime(&config, &settings)?;
    runtime.backend.validate()?;

    info!(
        "backend {} ({} -> {}), {} workers, {} retries, {:.1}s delay",
        runtime.backend.kind.as_str(),
        runtime.options.source_lang,
        runtime.options.target_lang,
        runtime.threads,
        runtime.options.retries,
        runtime.options.wait.as_secs_f32()
    );

    let spec = runtime.backend.clone();
    let report = batch::run_batch(&config.path, runtime.threads, &runtime.options, || {
        spec.build()
    })
    .await?;

    info!(
        "done: {} translated, {} failed, {} not HTML",
        report.translated(),
        report.failed(),
        report.not_html()
    );
    if report.unavailable_units() > 0 {
        warn!(
            "{} units were left untranslated after exhausting retries",
            report.unavailable_units()
        );
    }
    Ok(report)
}

pub fn resolve_runtime(config: &Config, settings: &settings::Settings) -> Result<Runtime> {
    let kind = BackendKind::from_name(&config.backend)?;

    let retries = config.retry.unwrap_or(settings.retries);
    if retries == 0 {
        return Err(anyhow!("retry count must be at least 1"));
    }
    let threads = config.threads.unwrap_or(settings.threads);
    if threads == 0 {
        return Err(anyhow!("thread count must be at least 1"));
    }
    let wait_sec = config.wait_sec.unwrap_or(settings.wait_sec);
    if !wait_sec.is_finite() || wait_sec < 0.0 {
        return Err(anyhow!("wait seconds must be zero or positive, got {}", wait_sec));
    }
    let timeout = match config.timeout.or(settings.timeout_sec) {
        Some(secs) if secs.is_finite() && secs > 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(secs) => return Err(anyhow!("timeout must be positive, got {}", secs)),
        None => None,
    };

    let source_lang = pick(config.source_lang.as_deref(), &settings.source_lang);
    let target_lang = pick(config.target_lang.as_deref(), &settings.target_lang);
    let model = config
        .model
        .clone()
        .or_else(|| settings.models.get(kind.as_str()).cloned());

    Ok(Runtime {
        backend: BackendSpec::new(
            kind,
            BackendOptions {
                host: config.host.clone().or_else(|| settings.host.clone()),
                proxy: config.proxy.clone().or_else(|| settings.proxy.clone()),
                timeout,
                model,
                key: config.key.clone(),
            },
        ),
        options: TranslateOptions {
            source_lang,
            target_lang,
            retries,
            wait: Duration::from_secs_f64(wait_sec),
        },
        threads,
    })
}

fn pick(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}
