use scraper::{ElementRef, Html, Selector};

use super::error::ExtractError;

/// What an extractor pulls out of one page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
    pub lang: String,
}

pub trait ArticleExtractor: Sync {
    fn extract(&self, html: &str, final_url: &str) -> Result<Extracted, ExtractError>;
}

/// Container heuristics over the parsed DOM, falling back to paragraphs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScraperExtractor;

// likely article containers, tried in order
const CONTAINERS: &[&str] = &[
    "article",
    "main",
    "[role=main]",
    "#content",
    "[itemprop=articleBody]",
    ".post-content",
];
const CONTAINER_MIN_CHARS: usize = 200;
const HIDDEN: &[&str] = &["script", "style", "noscript", "template"];

impl ArticleExtractor for ScraperExtractor {
    fn extract(&self, html: &str, _final_url: &str) -> Result<Extracted, ExtractError> {
        let doc = Html::parse_document(html);
        let text = body_text(&doc).ok_or(ExtractError::NoContent)?;
        Ok(Extracted { title: title(&doc), text, lang: lang(&doc) })
    }
}

fn body_text(doc: &Html) -> Option<String> {
    for sel in CONTAINERS {
        if let Some(text) = select_text(doc, sel) {
            if text.chars().count() >= CONTAINER_MIN_CHARS { return Some(text); }
        }
    }

    let p_sel = Selector::parse("p").ok()?;
    let paragraphs: Vec<String> = doc.select(&p_sel).map(visible_text).filter(|s| !s.is_empty()).collect();
    let joined = paragraphs.join("\n");
    if joined.trim().is_empty() { None } else { Some(joined) }
}

fn select_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let node = doc.select(&sel).next()?;
    let s = visible_text(node);
    if s.is_empty() { None } else { Some(s) }
}

/// Text under `node` outside script-like elements, one trimmed line per source line.
fn visible_text(node: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for n in node.descendants() {
        let Some(t) = n.value().as_text() else { continue };
        let hidden = n
            .parent()
            .and_then(|p| p.value().as_element().map(|el| HIDDEN.contains(&el.name())))
            .unwrap_or(false);
        if !hidden { raw.push_str(t); }
    }
    normalize(&raw)
}

fn normalize(s: &str) -> String {
    let mut out = String::new();
    for line in s.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() { continue; }
        if !out.is_empty() { out.push('\n'); }
        out.push_str(trimmed);
    }
    out
}

fn title(doc: &Html) -> String {
    let og = first_attr(doc, r#"meta[property="og:title"]"#, "content");
    og.or_else(|| first_text(doc, "title")).or_else(|| first_text(doc, "h1")).unwrap_or_default()
}

/// Primary language subtag from `<html lang>`, lowercased.
fn lang(doc: &Html) -> String {
    first_attr(doc, "html", "lang")
        .and_then(|l| l.split(['-', '_']).next().map(str::to_ascii_lowercase))
        .unwrap_or_default()
}

fn first_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|v| !v.is_empty())
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|v| !v.is_empty())
}
