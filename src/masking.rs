//! Placeholder masking for HTML fragments sent through plain-text translators.
//!
//! Markup is swapped for `【T<n>】` tokens before translation and swapped back
//! afterwards. The token table lives only as long as one fragment.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

/// Elements whose whole subtree is carried through translation untouched.
pub const PROTECTED_ELEMENTS: &[&str] = &["pre", "code", "tt", "var", "kbd"];

#[allow(clippy::expect_used)]
static PROTECTED_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = PROTECTED_ELEMENTS
        .iter()
        .map(|tag| format!(r"<{tag}(?:\s[^>]*)?>.*?</{tag}\s*>"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?is){alternatives}")).expect("PROTECTED_ELEMENT regex")
});

#[allow(clippy::expect_used)]
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("ANY_TAG regex"));

#[allow(clippy::expect_used)]
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:[A-Za-z][A-Za-z0-9]*|#[0-9]+|#[xX][0-9A-Fa-f]+);").expect("ENTITY regex")
});

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【T([0-9]+)】").expect("PLACEHOLDER regex"));

#[allow(clippy::expect_used)]
static LOOSE_CORNER_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)【\s*T\s*([0-9]+)\s*】").expect("LOOSE_CORNER_PLACEHOLDER regex")
});

#[allow(clippy::expect_used)]
static LOOSE_SQUARE_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*T\s*([0-9]+)\s*\]").expect("LOOSE_SQUARE_PLACEHOLDER regex")
});

/// One masked piece of markup and whether the source had whitespace
/// right before and after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub markup: String,
    pub space_before: bool,
    pub space_after: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskedFragment {
    pub text: String,
    pub tokens: Vec<Token>,
}

impl MaskedFragment {
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tokens.is_empty()
    }

    /// True when something other than placeholders and whitespace is left.
    pub fn has_text(&self) -> bool {
        !PLACEHOLDER.replace_all(&self.text, "").trim().is_empty()
    }

    pub fn markup(&self) -> Vec<&str> {
        self.tokens.iter().map(|token| token.markup.as_str()).collect()
    }

    pub fn restore(&self, translated: &str) -> String {
        restore(translated, &self.tokens)
    }
}

pub fn placeholder(index: usize) -> String {
    format!("【T{index}】")
}

/// Masks protected elements, then leftover tags, then entities, and folds
/// the fragment onto one line. Every token is padded with one space on
/// each side.
pub fn mask(html: &str) -> MaskedFragment {
    if html.trim().is_empty() {
        return MaskedFragment::default();
    }

    let mut tokens = Vec::new();
    let mut text = html.to_string();
    for pattern in [&*PROTECTED_ELEMENT, &*ANY_TAG, &*ENTITY] {
        let current = text;
        text = pattern
            .replace_all(&current, |caps: &Captures<'_>| {
                let Some(whole) = caps.get(0) else {
                    return String::new();
                };
                tokens.push(Token {
                    markup: whole.as_str().to_string(),
                    space_before: source_space_before(&current, whole.start()),
                    space_after: source_space_after(&current, whole.end()),
                });
                format!(" {} ", placeholder(tokens.len() - 1))
            })
            .into_owned();
    }

    let text = text.replace('\n', " ").replace('\r', "");
    MaskedFragment { text, tokens }
}

// Padding from an earlier pass sits right next to a placeholder bracket and
// does not count as source whitespace.
fn source_space_before(text: &str, start: usize) -> bool {
    let mut chars = text[..start].chars().rev();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.next() != Some('】'),
        _ => false,
    }
}

fn source_space_after(text: &str, end: usize) -> bool {
    let mut chars = text[end..].chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.next() != Some('【'),
        _ => false,
    }
}

/// Puts the original markup back for every token present in `text`.
///
/// Tokens may appear any number of times. A token without a table entry is
/// kept as-is. The padding space next to a token is dropped only where the
/// source had no whitespace on that side, or where another whitespace
/// character is left to separate the words.
pub fn restore(text: &str, tokens: &[Token]) -> String {
    let mut restored = String::with_capacity(text.len());
    let mut cursor = 0;
    for caps in PLACEHOLDER.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        let token = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|index| tokens.get(index));
        let Some(token) = token else {
            warn!(
                "placeholder {} has no entry in a table of {} tokens; leaving it in place",
                whole.as_str(),
                tokens.len()
            );
            continue;
        };

        let before = &text[cursor..whole.start()];
        restored.push_str(trim_padding_end(before, token.space_before));
        restored.push_str(&token.markup);
        cursor = whole.end() + padding_after(&text[whole.end()..], token.space_after);
    }
    restored.push_str(&text[cursor..]);
    restored
}

fn trim_padding_end(segment: &str, keep_single: bool) -> &str {
    let mut chars = segment.char_indices().rev();
    match chars.next() {
        Some((index, c)) if c.is_whitespace() => {
            let doubled = chars.next().is_some_and(|(_, c)| c.is_whitespace());
            if doubled || !keep_single {
                &segment[..index]
            } else {
                segment
            }
        }
        _ => segment,
    }
}

/// Byte length of the padding to skip after a token.
fn padding_after(rest: &str, keep_single: bool) -> usize {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => {
            let doubled = chars.next().is_some_and(char::is_whitespace);
            if doubled || !keep_single { c.len_utf8() } else { 0 }
        }
        _ => 0,
    }
}

/// Normalizes placeholder spellings translators tend to produce
/// (`【 t 3 】`, `[T3]`, `[ t 3 ]`) back to `【T3】`.
pub fn repair_placeholders(text: &str) -> String {
    let text = LOOSE_CORNER_PLACEHOLDER.replace_all(text, "【T${1}】");
    LOOSE_SQUARE_PLACEHOLDER
        .replace_all(&text, "【T${1}】")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glued(markup: &str) -> Token {
        Token {
            markup: markup.to_string(),
            space_before: false,
            space_after: false,
        }
    }

    #[test]
    fn masks_tags_in_order() {
        let fragment = mask("a <b>b</b> c");
        insta::assert_snapshot!(fragment.text, @"a  【T0】 b 【T1】  c");
        assert_eq!(fragment.markup(), vec!["<b>", "</b>"]);
        assert!(fragment.tokens[0].space_before);
        assert!(!fragment.tokens[0].space_after);
        assert!(!fragment.tokens[1].space_before);
        assert!(fragment.tokens[1].space_after);
    }

    #[test]
    fn padding_from_earlier_passes_is_not_source_whitespace() {
        let fragment = mask("<b><code>x</code></b> &amp;y");
        assert_eq!(fragment.markup(), vec!["<code>x</code>", "<b>", "</b>", "&amp;"]);
        assert!(!fragment.tokens[0].space_before);
        assert!(!fragment.tokens[0].space_after);
        assert!(!fragment.tokens[1].space_after);
        assert!(fragment.tokens[2].space_after);
        assert!(fragment.tokens[3].space_before);
        assert!(!fragment.tokens[3].space_after);
    }

    #[test]
    fn protected_element_is_a_single_token() {
        let fragment = mask("<p>a <code>&lt;x&gt;</code> b</p>");
        assert_eq!(fragment.markup(), vec!["<code>&lt;x&gt;</code>", "<p>", "</p>"]);
        assert!(!fragment.text.contains('<'));
        assert!(!fragment.text.contains('&'));
    }

    #[test]
    fn protected_element_spans_lines() {
        let html = "see <pre class=\"rust\">fn main() {\n    1 < 2;\n}</pre> below";
        let fragment = mask(html);
        assert_eq!(
            fragment.markup(),
            vec!["<pre class=\"rust\">fn main() {\n    1 < 2;\n}</pre>"]
        );
        assert_eq!(fragment.restore(&fragment.text), html);
    }

    #[test]
    fn protected_tags_match_their_own_closer() {
        let fragment = mask("<pre><code>x</code></pre>");
        assert_eq!(fragment.markup(), vec!["<pre><code>x</code></pre>"]);
    }

    #[test]
    fn entities_are_masked() {
        let fragment = mask("Tom &amp; Jerry &#169; &#xA9;");
        assert_eq!(fragment.markup(), vec!["&amp;", "&#169;", "&#xA9;"]);
        assert!(!fragment.text.contains('&'));
    }

    #[test]
    fn line_breaks_are_folded() {
        let fragment = mask("one\r\ntwo\nthree");
        assert_eq!(fragment.text, "one two three");
    }

    #[test]
    fn empty_input_short_circuits() {
        assert!(mask("").is_empty());
        assert!(mask("  \n\t ").is_empty());
        assert!(!mask("  \n\t ").has_text());
    }

    #[test]
    fn markup_only_fragment_has_no_text() {
        let fragment = mask("<img src=\"a.png\"/> <code>x</code>");
        assert!(!fragment.is_empty());
        assert!(!fragment.has_text());
        assert!(mask("<em>word</em>").has_text());
    }

    #[test]
    fn round_trip_reproduces_input() {
        let cases = [
            "plain text",
            "a <b>bold</b> and <i>italic</i>",
            "<a href=\"x.html\">link</a>&nbsp;tail",
            "x <code>&lt;y&gt;</code> z &amp; <kbd>Ctrl</kbd>+<kbd>C</kbd>",
            "<br/><img src=\"a.png\" alt=\"\"/>",
            "<span><em>nested</em></span> end",
            "<b> <i>spaced</i> </b>",
            "中文<b>粗体</b>中文",
        ];
        for html in cases {
            let fragment = mask(html);
            assert_eq!(fragment.restore(&fragment.text), html, "case: {html}");
        }
    }

    #[test]
    fn collapsed_padding_keeps_words_apart() {
        let fragment = mask("Hello <b>big</b> world &amp; more");
        let collapsed = fragment.text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(collapsed, "Hello 【T0】 big 【T1】 world 【T2】 more");
        assert_eq!(
            fragment.restore(&collapsed),
            "Hello <b>big</b> world &amp; more"
        );
    }

    #[test]
    fn collapsed_padding_keeps_glued_markup_glued() {
        let fragment = mask("un<i>believ</i>able");
        let collapsed = fragment.text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(fragment.restore(&collapsed), "un<i>believ</i>able");
    }

    #[test]
    fn added_padding_drops_only_one_space_per_side() {
        let fragment = mask("Hello <b>big</b> world");
        assert_eq!(
            fragment.restore("Hallo   【T0】  groß  【T1】   Welt"),
            "Hallo  <b> groß </b>  Welt"
        );
    }

    #[test]
    fn missing_padding_is_left_alone() {
        let fragment = mask("Hello <b>big</b> world");
        assert_eq!(
            fragment.restore("Hallo【T0】groß【T1】Welt"),
            "Hallo<b>groß</b>Welt"
        );
    }

    #[test]
    fn restore_is_idempotent_without_placeholders() {
        let tokens = vec![glued("<b>")];
        let once = restore("<b>already</b> restored", &tokens);
        assert_eq!(restore(&once, &tokens), once);
    }

    #[test]
    fn restore_handles_duplicated_and_dropped_tokens() {
        let tokens = vec![glued("<b>"), glued("</b>")];
        assert_eq!(restore("【T0】x【T0】", &tokens), "<b>x<b>");
        assert_eq!(restore("x 【T1】", &tokens), "x</b>");
        assert_eq!(restore("nothing", &tokens), "nothing");
    }

    #[test]
    fn restore_leaves_unknown_tokens() {
        let tokens = vec![glued("<b>")];
        assert_eq!(restore("a【T7】b", &tokens), "a【T7】b");
        assert_eq!(restore("a 【T7】 b 【T0】 c", &tokens), "a 【T7】 b<b>c");
    }

    #[test]
    fn restored_markup_is_not_rescanned() {
        let tokens = vec![glued("【T1】"), glued("<b>")];
        assert_eq!(restore("【T0】", &tokens), "【T1】");
    }

    #[test]
    fn repairs_mangled_placeholders() {
        assert_eq!(repair_placeholders("[ t 3 ]"), "【T3】");
        assert_eq!(repair_placeholders("【 T3 】"), "【T3】");
        assert_eq!(repair_placeholders("[T3]"), "【T3】");
        assert_eq!(repair_placeholders("a 【t 12】 b [T 0] c"), "a 【T12】 b 【T0】 c");
        assert_eq!(repair_placeholders("[note]"), "[note]");
    }
}
