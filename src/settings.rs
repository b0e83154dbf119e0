use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::retry::{DEFAULT_RETRIES, DEFAULT_SOURCE_LANG, DEFAULT_TARGET_LANG};

pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_WAIT_SEC: f64 = 1.5;

const PROJECT_SETTINGS: &str = "chapter-translator.toml";
const PROJECT_LOCAL_SETTINGS: &str = "chapter-translator.local.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_lang: String,
    pub target_lang: String,
    pub retries: usize,
    pub wait_sec: f64,
    pub threads: usize,
    pub timeout_sec: Option<f64>,
    pub host: Option<String>,
    pub proxy: Option<String>,
    /// Default model per backend name.
    pub models: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_lang: DEFAULT_SOURCE_LANG.to_string(),
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            retries: DEFAULT_RETRIES,
            wait_sec: DEFAULT_WAIT_SEC,
            threads: DEFAULT_THREADS,
            timeout_sec: None,
            host: None,
            proxy: None,
            models: HashMap::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    translation: Option<TranslationSettings>,
    runtime: Option<RuntimeSettings>,
    network: Option<NetworkSettings>,
    models: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    source: Option<String>,
    target: Option<String>,
    retry: Option<usize>,
    wait_sec: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RuntimeSettings {
    threads: Option<usize>,
    timeout: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkSettings {
    host: Option<String>,
    proxy: Option<String>,
}

/// Loads built-in defaults, then the home settings file, then the project
/// files in the working directory, then `extra_path`; later files win.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut ordered_paths = Vec::new();
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
    }
    ordered_paths.push(PathBuf::from(PROJECT_SETTINGS));
    ordered_paths.push(PathBuf::from(PROJECT_LOCAL_SETTINGS));

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    load_settings_from(&ordered_paths)
}

pub(crate) fn load_settings_from(paths: &[PathBuf]) -> Result<Settings> {
    let mut settings = Settings::default();
    for path in paths {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }
    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(translation) = incoming.translation {
            if let Some(source) = non_blank(translation.source) {
                self.source_lang = source;
            }
            if let Some(target) = non_blank(translation.target) {
                self.target_lang = target;
            }
            if let Some(retry) = translation.retry {
                self.retries = retry;
            }
            if let Some(wait) = translation.wait_sec {
                self.wait_sec = wait;
            }
        }
        if let Some(runtime) = incoming.runtime {
            if let Some(threads) = runtime.threads {
                self.threads = threads;
            }
            if let Some(timeout) = runtime.timeout {
                self.timeout_sec = Some(timeout);
            }
        }
        if let Some(network) = incoming.network {
            if let Some(host) = non_blank(network.host) {
                self.host = Some(host);
            }
            if let Some(proxy) = non_blank(network.proxy) {
                self.proxy = Some(proxy);
            }
        }
        if let Some(models) = incoming.models {
            for (backend, model) in models {
                if !model.trim().is_empty() {
                    self.models.insert(backend.to_lowercase(), model);
                }
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".chapter-translator"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_files_override_earlier_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = dir.path().join("base.toml");
        let local = dir.path().join("local.toml");
        fs::write(
            &base,
            r#"
[translation]
target = "ja"
retry = 3
wait_sec = 0.5

[runtime]
threads = 2

[models]
OpenAI = "gpt-4.1-mini"
"#,
        )
        .expect("write base");
        fs::write(
            &local,
            r#"
[translation]
retry = 5

[network]
proxy = "127.0.0.1:1080"
host = "  "
"#,
        )
        .expect("write local");

        let settings = load_settings_from(&[
            base,
            dir.path().join("missing.toml"),
            local,
        ])
        .expect("settings");
        assert_eq!(settings.target_lang, "ja");
        assert_eq!(settings.source_lang, "auto");
        assert_eq!(settings.retries, 5);
        assert_eq!(settings.wait_sec, 0.5);
        assert_eq!(settings.threads, 2);
        assert_eq!(settings.proxy.as_deref(), Some("127.0.0.1:1080"));
        assert_eq!(settings.host, None);
        assert_eq!(settings.models.get("openai").map(String::as_str), Some("gpt-4.1-mini"));
    }

    #[test]
    fn defaults_without_files() {
        let settings = load_settings_from(&[]).expect("settings");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.threads, 8);
        assert_eq!(settings.retries, 10);
        assert_eq!(settings.target_lang, "zh-CN");
    }

    #[test]
    fn invalid_toml_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[translation\nretry = ").expect("write");
        let err = load_settings_from(&[path]).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.toml"));
    }

    #[test]
    fn missing_extra_settings_file_is_an_error() {
        let err = load_settings(Some(Path::new("/nonexistent/chapter-translator.toml"))).unwrap_err();
        assert!(err.to_string().contains("settings file not found"));
    }
}
