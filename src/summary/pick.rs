use crate::text::{is_placeholder, sanitize, truncate_chars};

pub const MAX_SENTENCES: usize = 3;
pub const MAX_SUMMARY_CHARS: usize = 1200;

const TITLE_SEPARATORS: &[char] = &[' ', '-', ':', '—', '–', '\n', '\t'];

/// Thresholds a sanitized candidate must clear.
#[derive(Clone, Copy, Debug)]
pub struct Thresholds {
    pub min_clean_len: usize,
    pub min_tokens: usize,
}

/// Longest sanitized candidate that is not a placeholder. The first of equally
/// long candidates wins.
pub fn best_candidate<'a, I>(candidates: I, th: Thresholds) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<String> = None;
    for raw in candidates {
        if raw.trim().is_empty() { continue; }
        let clean = sanitize(raw);
        if is_placeholder(&clean, th.min_clean_len, th.min_tokens) { continue; }
        let longer = best.as_ref().is_none_or(|b| clean.chars().count() > b.chars().count());
        if longer { best = Some(clean); }
    }
    best
}

/// First sentences of `text` with a leading repeat of `title` removed.
pub fn pick_summary(text: &str, title: &str) -> String {
    let t = sanitize(text);
    let body = strip_title(&t, title.trim());
    let sentences: Vec<&str> = split_sentences(body).into_iter().take(MAX_SENTENCES).collect();
    let joined = sentences.join(" ");
    truncate_chars(&joined, MAX_SUMMARY_CHARS).trim().to_string()
}

/// `text` without a case-insensitive `title` prefix and the separators after it.
fn strip_title<'a>(text: &'a str, title: &str) -> &'a str {
    if title.is_empty() { return text; }
    let mut rest = text.char_indices();
    for tc in title.chars() {
        match rest.next() {
            Some((_, c)) if c.to_lowercase().eq(tc.to_lowercase()) => {}
            _ => return text,
        }
    }
    let cut = rest.next().map(|(i, _)| i).unwrap_or(text.len());
    text[cut..].trim_start_matches(TITLE_SEPARATORS)
}

/// Split after `.`, `!` or `?` when followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            out.push(&text[start..i]);
            while let Some(&(_, w)) = chars.peek() {
                if !w.is_whitespace() { break; }
                chars.next();
            }
            start = chars.peek().map(|(j, _)| *j).unwrap_or(text.len());
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    if start < text.len() { out.push(&text[start..]); }
    out
}
