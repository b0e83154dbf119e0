use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser};

#[derive(Parser, Debug)]
#[command(
    name = "chapter-translator",
    version,
    disable_version_flag = true,
    about = "Translate e-book chapter HTML in place, keeping markup and code intact"
)]
struct Cli {
    /// Translation backend: google, openai, claude or gemini
    backend: String,

    /// HTML file, or a directory whose HTML files are all translated
    path: PathBuf,

    /// Backend host (default depends on the backend)
    #[arg(short = 'H', long = "host")]
    host: Option<String>,

    /// HTTP proxy, e.g. 127.0.0.1:1080
    #[arg(short = 'P', long = "proxy")]
    proxy: Option<String>,

    /// Request timeout in seconds
    #[arg(short = 'T', long = "timeout")]
    timeout: Option<f64>,

    /// Number of files translated concurrently (default: 8)
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Seconds to wait after each request (default: 1.5)
    #[arg(short = 'w', long = "wait-sec")]
    wait_sec: Option<f64>,

    /// Attempts per unit before giving up (default: 10)
    #[arg(short = 'r', long = "retry")]
    retry: Option<usize>,

    /// Source language, or "auto" to detect (default: auto)
    #[arg(short = 's', long = "src")]
    src: Option<String>,

    /// Target language (default: zh-CN)
    #[arg(short = 'd', long = "dst")]
    dst: Option<String>,

    /// Model name for LLM backends
    #[arg(short = 'm', long = "model")]
    model: Option<String>,

    /// API key (overrides environment variables)
    #[arg(short = 'k', long = "key")]
    key: Option<String>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'c', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable debug logging
    #[arg(short = 'D', long = "debug")]
    debug: bool,

    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    chapter_translator::logging::init(cli.debug)?;

    let config = chapter_translator::Config {
        backend: cli.backend,
        path: cli.path,
        host: cli.host,
        proxy: cli.proxy,
        timeout: cli.timeout,
        threads: cli.threads,
        wait_sec: cli.wait_sec,
        retry: cli.retry,
        source_lang: cli.src,
        target_lang: cli.dst,
        model: cli.model,
        key: cli.key,
        settings_path: cli.read_settings,
    };
    chapter_translator::run(config).await?;
    Ok(())
}
