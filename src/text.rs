use once_cell::sync::Lazy;
use regex::Regex;

// Literal UI, paywall and liveblog boilerplate that leaks into extracted text.
const NOISE_PHRASES: &[&str] = &[
    "One of your browser extensions seems to be blocking the video player",
    "To watch this content, you may need to disable it on this site",
    "Follow our liveblog",
    "for all the latest developments.",
    "for all the latest updates.",
    "from loading. . from loading.",
    "from loading. .",
    "from loading.",
];

static NOISE_RE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)\bLive:\s*",
        r"(?im)\bFollow (our )?liveblog.*$",
        r"(?im)\bfrom loading(?:\s*\.)*",
        r"(?im)\bblocking the video player from loading\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex"));
static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfrom loading\b|\bblocking the video player\b").expect("static regex"));

/// Strip boilerplate phrases and noise patterns, then collapse whitespace.
pub fn sanitize(text: &str) -> String {
    let mut t = text.trim().to_string();
    for p in NOISE_PHRASES {
        if t.contains(p) { t = t.replace(p, " "); }
    }
    for rx in NOISE_RE.iter() {
        t = rx.replace_all(&t, " ").into_owned();
    }
    collapse_whitespace(&t)
}

pub fn collapse_whitespace(s: &str) -> String { WS_RE.replace_all(s, " ").trim().to_string() }

/// Lowercased word tokens of the sanitized text. Tokens shorter than
/// `min_len` characters are dropped.
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    let t = sanitize(text).to_lowercase();
    WORD_RE
        .find_iter(&t)
        .map(|m| m.as_str())
        .filter(|tok| tok.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

pub fn token_count(text: &str) -> usize { WORD_RE.find_iter(text).count() }

/// Empty, blocked-player or otherwise too thin to be worth showing.
pub fn is_placeholder(clean: &str, min_len: usize, min_tokens: usize) -> bool {
    clean.is_empty()
        || PLACEHOLDER_RE.is_match(clean)
        || clean.chars().count() < min_len
        || token_count(clean) < min_tokens
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
