//! Per-document cleanup run before the walker.
//!
//! Chapters exported from e-book tooling come as XHTML with their own code
//! block conventions; they are folded into plain `<pre>`/`<code>` so the
//! masker protects them. XHTML input keeps its XML declaration and root
//! namespaces and is written back as XML.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use kuchiki::NodeRef;
use regex::Regex;
use tracing::debug;

use crate::dom::{new_element, parse_document, select_all, to_xhtml};

const CODE_BLOCK_SELECTORS: &str = "div.code, div.Code";
const INLINE_CODE_SELECTORS: &str = "span.inline-code, span.CodeInline";

#[allow(clippy::expect_used)]
static XML_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\?xml[^>]*\?>").expect("XML_DECLARATION regex"));

#[allow(clippy::expect_used)]
static XMLNS_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*xmlns(?::[A-Za-z0-9_.-]+)?="[^"]*""#).expect("XMLNS_ATTRIBUTE regex")
});

#[allow(clippy::expect_used)]
static ROOT_START_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html\b[^>]*>").expect("ROOT_START_TAG regex"));

#[allow(clippy::expect_used)]
static NAMESPACE_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"xmlns(?::([A-Za-z0-9_.-]+))?="([^"]*)""#).expect("NAMESPACE_DECLARATION regex")
});

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// How a document is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Html,
    Xhtml,
}

impl Syntax {
    /// XHTML when the markup opens with an XML declaration or declares the
    /// XHTML namespace.
    pub fn detect(html: &str) -> Self {
        if html.trim_start().starts_with("<?xml") || html.contains(XHTML_NAMESPACE) {
            Syntax::Xhtml
        } else {
            Syntax::Html
        }
    }

    /// `.xhtml` files are always XHTML; anything else is sniffed.
    pub fn for_path(path: &Path, html: &str) -> Self {
        let xhtml_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xhtml"));
        if xhtml_extension {
            Syntax::Xhtml
        } else {
            Syntax::detect(html)
        }
    }
}

/// A cleaned, parsed document and what is needed to write it back.
pub struct Prepared {
    pub document: NodeRef,
    pub syntax: Syntax,
    declaration: Option<String>,
}

impl Prepared {
    pub fn serialize(&self) -> Result<String> {
        match self.syntax {
            Syntax::Html => Ok(self.document.to_string()),
            Syntax::Xhtml => {
                let mut out = String::new();
                if let Some(declaration) = &self.declaration {
                    out.push_str(declaration);
                    out.push('\n');
                }
                out.push_str(&to_xhtml(&self.document)?);
                Ok(out)
            }
        }
    }
}

/// String-level cleanup: XML declarations, namespace declarations and
/// non-breaking space entities.
pub fn preprocess_markup(html: &str) -> String {
    let html = XML_DECLARATION.replace_all(html, "");
    let html = XMLNS_ATTRIBUTE.replace_all(&html, "");
    html.replace("&#160;", " ").replace("&nbsp;", " ")
}

/// Rewrites `div.code` blocks into `<pre>` and inline code spans into
/// `<code>`, keeping only their text.
pub fn normalize_code_blocks(document: &NodeRef) -> Result<()> {
    let blocks = replace_with_text_element(document, CODE_BLOCK_SELECTORS, "pre")?;
    let inline = replace_with_text_element(document, INLINE_CODE_SELECTORS, "code")?;
    if blocks + inline > 0 {
        debug!("normalized {} code blocks and {} inline code spans", blocks, inline);
    }
    Ok(())
}

/// Cleans up `html` and parses it into a document ready for the walker.
pub fn preprocess(html: &str, syntax: Syntax) -> Result<Prepared> {
    let document = parse_document(&preprocess_markup(html));
    normalize_code_blocks(&document)?;

    let mut declaration = None;
    if syntax == Syntax::Xhtml {
        declaration = XML_DECLARATION
            .find(html)
            .map(|found| found.as_str().to_string());
        restore_root_namespaces(&document, html);
    }
    Ok(Prepared {
        document,
        syntax,
        declaration,
    })
}

/// Puts the `xmlns` declarations of the source `<html>` tag back on the
/// parsed root; a root without one gets the XHTML namespace.
fn restore_root_namespaces(document: &NodeRef, html: &str) {
    let Ok(root) = document.select_first("html") else {
        return;
    };
    let mut declarations = ROOT_START_TAG
        .find(html)
        .map(|tag| {
            NAMESPACE_DECLARATION
                .captures_iter(tag.as_str())
                .map(|caps| {
                    let name = match caps.get(1) {
                        Some(prefix) => format!("xmlns:{}", prefix.as_str()),
                        None => "xmlns".to_string(),
                    };
                    (name, caps[2].to_string())
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !declarations.iter().any(|(name, _)| name == "xmlns") {
        declarations.push(("xmlns".to_string(), XHTML_NAMESPACE.to_string()));
    }

    let mut attributes = root.attributes.borrow_mut();
    for (name, value) in declarations {
        attributes.insert(name.as_str(), value);
    }
}

fn replace_with_text_element(document: &NodeRef, selectors: &str, tag: &str) -> Result<usize> {
    let matches = select_all(document, selectors)?;
    for node in &matches {
        let replacement = new_element(tag)?;
        replacement.append(NodeRef::new_text(node.text_contents()));
        node.insert_before(replacement);
        node.detach();
    }
    Ok(matches.len())
}
