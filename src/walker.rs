use anyhow::Result;
use kuchiki::NodeRef;
use tracing::debug;

use crate::backends::Backend;
use crate::dom::{child_elements, has_child_element, inner_html, select_all, set_inner_html};
use crate::preprocess::{Syntax, preprocess};
use crate::retry::TranslateOptions;
use crate::unit::{UnitOutcome, translate_unit};

const TEXT_BLOCKS: &str = "p, h1, h2, h3, h4, h5, h6";
const CONTAINER_BLOCKS: &str = "blockquote, td, th";
const LIST_ITEMS: &str = "li";
const SUB_LISTS: &[&str] = &["ul", "ol"];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkReport {
    pub translated: usize,
    pub unavailable: usize,
    /// Units with nothing but markup or whitespace.
    pub untouched: usize,
    /// Containers left to their paragraph children.
    pub skipped: usize,
}

impl WalkReport {
    pub fn units(&self) -> usize {
        self.translated + self.unavailable + self.untouched
    }
}

/// Translates a whole document and returns the serialized result, written
/// back as XHTML when the input looks like XHTML.
pub async fn translate_html<B: Backend + ?Sized>(
    html: &str,
    backend: &B,
    options: &TranslateOptions,
) -> Result<(String, WalkReport)> {
    translate_markup(html, Syntax::detect(html), backend, options).await
}

pub async fn translate_markup<B: Backend + ?Sized>(
    html: &str,
    syntax: Syntax,
    backend: &B,
    options: &TranslateOptions,
) -> Result<(String, WalkReport)> {
    let prepared = preprocess(html, syntax)?;
    let report = translate_document(&prepared.document, backend, options).await?;
    Ok((prepared.serialize()?, report))
}

/// Walks paragraphs and headings, then quotes and table cells, then list
/// items, replacing each unit's content in place.
///
/// The pass order matters: list items detach their nested lists, which
/// must not have been rewritten by an earlier pass.
pub async fn translate_document<B: Backend + ?Sized>(
    document: &NodeRef,
    backend: &B,
    options: &TranslateOptions,
) -> Result<WalkReport> {
    let mut report = WalkReport::default();

    for node in select_all(document, TEXT_BLOCKS)? {
        translate_element(&node, backend, options, &mut report).await?;
    }

    for node in select_all(document, CONTAINER_BLOCKS)? {
        if has_child_element(&node, &["p"]) {
            report.skipped += 1;
            continue;
        }
        translate_element(&node, backend, options, &mut report).await?;
    }

    for node in select_all(document, LIST_ITEMS)? {
        if has_child_element(&node, &["p"]) {
            report.skipped += 1;
            continue;
        }
        let sub_lists = child_elements(&node, SUB_LISTS);
        for list in &sub_lists {
            list.detach();
        }
        let result = translate_element(&node, backend, options, &mut report).await;
        for list in sub_lists {
            node.append(list);
        }
        result?;
    }

    debug!(
        "walked {} units: {} translated, {} unavailable, {} untouched, {} skipped",
        report.units(),
        report.translated,
        report.unavailable,
        report.untouched,
        report.skipped
    );
    Ok(report)
}

async fn translate_element<B: Backend + ?Sized>(
    node: &NodeRef,
    backend: &B,
    options: &TranslateOptions,
    report: &mut WalkReport,
) -> Result<()> {
    let html = inner_html(node);
    match translate_unit(backend, &html, options).await {
        UnitOutcome::Translated(translated) => {
            set_inner_html(node, &translated)?;
            report.translated += 1;
        }
        UnitOutcome::NothingToTranslate => report.untouched += 1,
        UnitOutcome::Unavailable => report.unavailable += 1,
    }
    Ok(())
}
