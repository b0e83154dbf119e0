use anyhow::{Context, Result, anyhow};
use futures_util::future::join_all;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::backends::Backend;
use crate::retry::TranslateOptions;
use crate::preprocess::Syntax;
use crate::walker::{WalkReport, translate_markup};

pub const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Translated(WalkReport),
    NotHtml,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn translated(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::Translated(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::Failed(_)))
    }

    pub fn not_html(&self) -> usize {
        self.count(|status| matches!(status, FileStatus::NotHtml))
    }

    /// Units left in the source language because the backend never answered.
    pub fn unavailable_units(&self) -> usize {
        self.files
            .iter()
            .map(|file| match &file.status {
                FileStatus::Translated(report) => report.unavailable,
                _ => 0,
            })
            .sum()
    }

    fn count(&self, predicate: impl Fn(&FileStatus) -> bool) -> usize {
        self.files
            .iter()
            .filter(|file| predicate(&file.status))
            .count()
    }
}

pub fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            HTML_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// A file path is taken as-is; a directory yields its HTML files, sorted.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_dir() {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(path)
            .with_context(|| format!("failed to list directory: {}", path.display()))?;
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to read entry in {}", path.display()))?;
            let entry_path = entry.path();
            if entry_path.is_file() && is_html(&entry_path) {
                files.push(entry_path);
            }
        }
        files.sort();
        return Ok(files);
    }
    if path.exists() {
        return Ok(vec![path.to_path_buf()]);
    }
    Err(anyhow!("path not found: {}", path.display()))
}

/// Translates every file under `path` with at most `workers` files in
/// flight.
///
/// Each worker builds its own backend with `factory` the first time it
/// needs one and keeps it for the rest of its files. A failing file is
/// logged and recorded; it never stops the others.
pub async fn run_batch<B, F>(
    path: &Path,
    workers: usize,
    options: &TranslateOptions,
    factory: F,
) -> Result<BatchReport>
where
    B: Backend,
    F: Fn() -> Result<B>,
{
    let files = collect_files(path)?;
    if files.is_empty() {
        warn!("no HTML files found in {}", path.display());
        return Ok(BatchReport::default());
    }

    let workers = workers.clamp(1, files.len());
    info!("translating {} files with {} workers", files.len(), workers);
    let queue = RefCell::new(files.into_iter().enumerate().collect::<VecDeque<_>>());

    let results = join_all((0..workers).map(|_| worker(&queue, options, &factory))).await;
    let mut reports = results.into_iter().flatten().collect::<Vec<_>>();
    reports.sort_by_key(|(index, _)| *index);
    Ok(BatchReport {
        files: reports.into_iter().map(|(_, report)| report).collect(),
    })
}

async fn worker<B, F>(
    queue: &RefCell<VecDeque<(usize, PathBuf)>>,
    options: &TranslateOptions,
    factory: &F,
) -> Vec<(usize, FileReport)>
where
    B: Backend,
    F: Fn() -> Result<B>,
{
    let mut backend: Option<B> = None;
    let mut reports = Vec::new();
    loop {
        let next = queue.borrow_mut().pop_front();
        let Some((index, path)) = next else {
            break;
        };

        let status = if !is_html(&path) {
            warn!("{} is not an HTML file; skipping", path.display());
            FileStatus::NotHtml
        } else {
            match ensure_backend(&mut backend, factory) {
                Ok(backend) => process_file(&path, backend, options).await,
                Err(err) => failed(&path, err),
            }
        };
        reports.push((index, FileReport { path, status }));
    }
    reports
}

fn ensure_backend<'a, B, F>(slot: &'a mut Option<B>, factory: &F) -> Result<&'a B>
where
    F: Fn() -> Result<B>,
{
    if slot.is_none() {
        *slot = Some(factory().with_context(|| "failed to build translation backend")?);
    }
    slot.as_ref()
        .ok_or_else(|| anyhow!("translation backend is not available"))
}

async fn process_file<B: Backend>(
    path: &Path,
    backend: &B,
    options: &TranslateOptions,
) -> FileStatus {
    info!("{}", path.display());
    match translate_file(path, backend, options).await {
        Ok(report) => {
            info!(
                "{}: {} units translated, {} unavailable",
                path.display(),
                report.translated,
                report.unavailable
            );
            FileStatus::Translated(report)
        }
        Err(err) => failed(path, err),
    }
}

/// Reads the whole file, translates it in memory and writes it back once.
async fn translate_file<B: Backend>(
    path: &Path,
    backend: &B,
    options: &TranslateOptions,
) -> Result<WalkReport> {
    let html = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let syntax = Syntax::for_path(path, &html);
    let (translated, report) = translate_markup(&html, syntax, backend, options)
        .await
        .with_context(|| format!("failed to translate {}", path.display()))?;
    tokio::fs::write(path, translated)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(report)
}

fn failed(path: &Path, err: anyhow::Error) -> FileStatus {
    error!("{}: {:?}", path.display(), err);
    FileStatus::Failed(format!("{:#}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{FailingBackend, UppercaseBackend};
    use std::cell::Cell;
    use std::fs;
    use std::time::Duration;

    fn options() -> TranslateOptions {
        TranslateOptions {
            retries: 1,
            wait: Duration::ZERO,
            ..TranslateOptions::default()
        }
    }

    #[test]
    fn recognizes_html_extensions() {
        assert!(is_html(Path::new("ch01.html")));
        assert!(is_html(Path::new("ch01.XHTML")));
        assert!(is_html(Path::new("dir/index.htm")));
        assert!(!is_html(Path::new("notes.txt")));
        assert!(!is_html(Path::new("html")));
    }

    #[test]
    fn lists_html_files_in_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("b.htm"), "<p>b</p>").expect("write");
        fs::write(dir.path().join("a.html"), "<p>a</p>").expect("write");
        fs::write(dir.path().join("notes.txt"), "text").expect("write");
        fs::create_dir(dir.path().join("nested.html")).expect("mkdir");

        let files = collect_files(dir.path()).expect("files");
        assert_eq!(
            files,
            vec![dir.path().join("a.html"), dir.path().join("b.htm")]
        );
    }

    #[test]
    fn missing_path_is_an_error() {
        assert!(collect_files(Path::new("/nonexistent/chapter")).is_err());
    }

    #[tokio::test]
    async fn translates_directory_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["ch1.html", "ch2.html", "ch3.html", "ch4.xhtml"] {
            fs::write(dir.path().join(name), format!("<p>chapter {}</p>", name)).expect("write");
        }
        let builds = Cell::new(0usize);
        let report = run_batch(dir.path(), 2, &options(), || {
            builds.set(builds.get() + 1);
            Ok(UppercaseBackend::default())
        })
        .await
        .expect("batch");

        assert_eq!(report.translated(), 4);
        assert_eq!(report.failed(), 0);
        assert!(builds.get() >= 1 && builds.get() <= 2);
        let output = fs::read_to_string(dir.path().join("ch1.html")).expect("read");
        assert!(output.contains("<p>CHAPTER CH1.HTML</p>"));
        let names = report
            .files
            .iter()
            .map(|file| file.path.file_name().unwrap().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["ch1.html", "ch2.html", "ch3.html", "ch4.xhtml"]);
    }

    #[tokio::test]
    async fn single_worker_builds_one_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("only.html"), "<p>x</p>").expect("write");
        let builds = Cell::new(0usize);
        run_batch(dir.path(), 8, &options(), || {
            builds.set(builds.get() + 1);
            Ok(UppercaseBackend::default())
        })
        .await
        .expect("batch");
        assert_eq!(builds.get(), 1);
    }

    #[tokio::test]
    async fn non_html_file_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("notes.txt");
        fs::write(&path, "<p>hello</p>").expect("write");
        let builds = Cell::new(0usize);
        let report = run_batch(&path, 4, &options(), || {
            builds.set(builds.get() + 1);
            Ok(UppercaseBackend::default())
        })
        .await
        .expect("batch");

        assert_eq!(report.not_html(), 1);
        assert_eq!(builds.get(), 0);
        assert_eq!(fs::read_to_string(&path).expect("read"), "<p>hello</p>");
    }

    #[tokio::test]
    async fn broken_file_does_not_stop_siblings() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bad.html"), b"\xff\xfe\x00").expect("write");
        fs::write(dir.path().join("good.html"), "<p>fine</p>").expect("write");

        let report = run_batch(dir.path(), 1, &options(), || Ok(UppercaseBackend::default()))
            .await
            .expect("batch");

        assert_eq!(report.failed(), 1);
        assert_eq!(report.translated(), 1);
        match &report.files[0].status {
            FileStatus::Failed(message) => assert!(message.contains("bad.html")),
            other => panic!("unexpected status {:?}", other),
        }
        let good = fs::read_to_string(dir.path().join("good.html")).expect("read");
        assert!(good.contains("<p>FINE</p>"));
    }

    #[tokio::test]
    async fn unavailable_units_are_counted_and_file_is_still_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ch.html");
        fs::write(&path, "<?xml version='1.0'?><p>one</p><p>two</p>").expect("write");

        let report = run_batch(&path, 1, &options(), || Ok(FailingBackend::default()))
            .await
            .expect("batch");

        assert_eq!(report.translated(), 1);
        assert_eq!(report.unavailable_units(), 2);
        let output = fs::read_to_string(&path).expect("read");
        assert!(output.starts_with("<?xml version='1.0'?>\n<html xmlns="));
        assert!(output.contains("<p>one</p><p>two</p>"));
    }

    #[tokio::test]
    async fn backend_build_failure_fails_each_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.html"), "<p>a</p>").expect("write");
        fs::write(dir.path().join("b.html"), "<p>b</p>").expect("write");

        let report = run_batch(dir.path(), 1, &options(), || -> Result<UppercaseBackend> {
            Err(anyhow!("no key"))
        })
        .await
        .expect("batch");
        assert_eq!(report.failed(), 2);
    }

    #[tokio::test]
    async fn xhtml_files_are_written_as_xml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let xhtml = dir.path().join("ch.xhtml");
        let html = dir.path().join("ch.html");
        fs::write(&xhtml, "<p>a<br/>b</p>").expect("write");
        fs::write(&html, "<p>a<br/>b</p>").expect("write");

        run_batch(dir.path(), 2, &options(), || Ok(UppercaseBackend::default()))
            .await
            .expect("batch");

        let xhtml = fs::read_to_string(&xhtml).expect("read");
        assert!(xhtml.starts_with("<html xmlns=\"http://www.w3.org/1999/xhtml\">"));
        assert!(xhtml.contains("<p>A<br/>B</p>"));
        let html = fs::read_to_string(&html).expect("read");
        assert!(html.contains("<p>A<br>B</p>"));
    }
}
