//! HTML to speech-ready plain text.
//!
//! Extraction works on leaf blocks only (paragraphs, headings, list items,
//! blockquotes with no nested block of their own) so ancestor containers never
//! duplicate text. Cleanup then rewrites typography and stray punctuation that
//! speech engines would otherwise pronounce.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use unicode_normalization::UnicodeNormalization;

const LEAF_TAGS: [&str; 9] = ["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote"];
const SKIPPED_TAGS: [&str; 8] = [
    "script",
    "style",
    "nav",
    "aside",
    "figure",
    "figcaption",
    "noscript",
    "template",
];
const ELLIPSIS_MARK: &str = "\u{0}ELLIPSIS\u{0}";
const MAX_CLEANUP_PASSES: usize = 8;

static LEAF_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse(&LEAF_TAGS.join(", ")).unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());
static TITLE_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h1", "h2", "h3", "title"]
        .iter()
        .map(|tag| Selector::parse(tag).unwrap())
        .collect()
});

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_STANDALONE_PERIOD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(^|\s)\.(\s|$)").unwrap());
static RE_PUNCT_ONLY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[.\-–—,;:]+[ \t]*$").unwrap());
static RE_MISSING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([.!?])(\p{L})").unwrap());
static RE_DASH_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*[-–—][ \t]*\.[ \t]*").unwrap());
static RE_DASH_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*[-–—][ \t]*,[ \t]*").unwrap());
static RE_PERIOD_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]*\.[ \t]*[-–—][ \t]*").unwrap());
static RE_LEADING_PERIODS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*\.+[ \t]*").unwrap());
static RE_MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());
static RE_TRAILING_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+$").unwrap());
static RE_MULTI_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Text and heading pulled out of one chapter document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedChapter {
    pub title: Option<String>,
    /// Cleaned text; empty means the chapter carries nothing to narrate.
    pub text: String,
}

/// Parse a chapter document once and return both its heading and clean text.
pub fn extract_chapter(markup: &str) -> ExtractedChapter {
    let document = Html::parse_document(markup);
    ExtractedChapter {
        title: title_of(&document),
        text: clean_for_tts(&raw_text_of(&document)),
    }
}

/// Convert chapter markup into speech-ready text.
pub fn html_to_text(markup: &str) -> String {
    clean_for_tts(&raw_text_of(&Html::parse_document(markup)))
}

/// First non-empty `h1`, `h2`, `h3`, then `<title>`.
pub fn extract_title(markup: &str) -> Option<String> {
    title_of(&Html::parse_document(markup))
}

fn title_of(document: &Html) -> Option<String> {
    TITLE_SELECTORS.iter().find_map(|selector| {
        document.select(selector).find_map(|el| {
            let title = collapse_whitespace(&el.text().collect::<String>());
            (!title.is_empty()).then_some(title)
        })
    })
}

fn raw_text_of(document: &Html) -> String {
    let leaves: Vec<String> = document
        .select(&LEAF_SELECTOR)
        .filter(|el| !inside_skipped(el) && !has_nested_leaf(el))
        .map(|el| collapse_whitespace(&visible_text(el)))
        .filter(|text| !text.is_empty())
        .collect();
    if !leaves.is_empty() {
        return leaves.join("\n");
    }

    // No block structure at all: fall back to every visible text run.
    let scope = document
        .select(&BODY_SELECTOR)
        .next()
        .unwrap_or_else(|| document.root_element());
    scope
        .descendants()
        .filter_map(|node| node.value().as_text().map(|text| (node, text)))
        .filter(|(node, _)| {
            !node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|a| is_skipped(a.value().name()))
        })
        .map(|(_, text)| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_TAGS.contains(&name)
}

fn inside_skipped(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_skipped(a.value().name()))
}

fn has_nested_leaf(el: &ElementRef<'_>) -> bool {
    el.descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .any(|child| LEAF_TAGS.contains(&child.value().name()))
}

fn visible_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|a| a.id() != el.id())
            .any(|a| is_skipped(a.value().name()));
        if !hidden {
            out.push_str(text);
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Rewrite extracted text so a speech engine reads it naturally.
///
/// The passes repeat until the text stops changing, so applying this to its
/// own output is a no-op.
pub fn clean_for_tts(text: &str) -> String {
    let mut current: String = text.nfc().collect();
    for _ in 0..MAX_CLEANUP_PASSES {
        let next = cleanup_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn cleanup_pass(text: &str) -> String {
    let mut text = text
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2013}', '\u{2014}'], " ")
        .replace('\u{2026}', "...")
        .replace('\u{00A0}', " ");

    text = text.replace("...", ELLIPSIS_MARK);

    // Adjacent lone periods share their separating whitespace, so one sweep
    // can leave every other one behind.
    loop {
        let next = RE_STANDALONE_PERIOD.replace_all(&text, "$1$2").into_owned();
        if next == text {
            break;
        }
        text = next;
    }

    text = RE_PUNCT_ONLY_LINE.replace_all(&text, "").into_owned();
    text = RE_MISSING_SPACE.replace_all(&text, "$1 $2").into_owned();
    text = RE_DASH_PERIOD.replace_all(&text, ". ").into_owned();
    text = RE_DASH_COMMA.replace_all(&text, ", ").into_owned();
    text = RE_PERIOD_DASH.replace_all(&text, ". ").into_owned();
    text = RE_LEADING_PERIODS.replace_all(&text, "").into_owned();

    text = text.replace(ELLIPSIS_MARK, "...");
    text = RE_MULTI_SPACE.replace_all(&text, " ").into_owned();
    text = RE_TRAILING_SPACE.replace_all(&text, "").into_owned();
    text = RE_MULTI_NEWLINE.replace_all(&text, "\n\n").into_owned();
    text.trim().to_string()
}
