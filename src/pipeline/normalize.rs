//! Response normalisation: turn free-form model text into comments.
//!
//! The extraction prompt asks for bare JSON, but vision models do not always
//! comply. Observed deviations include:
//!
//! - wrapping the JSON in ` ```json ... ``` ` fences
//! - a prose preamble ("Here are the comments I found:") before the object
//! - output truncated mid-array when the token budget runs out
//! - no JSON at all, just a description of the screenshot
//!
//! Normalisation is a ladder of pure rungs (`&str → Option<Vec<Comment>>`),
//! tried strictly in order; the first rung that yields a value wins. The
//! final rung cannot fail, so [`normalize_response`] is total.
//!
//! ## Ladder
//!
//! 1. Fenced block: the first code fence's inner text, parsed as JSON
//! 2. Brace span: first `{` to last `}` of the raw text, parsed as JSON
//! 3. Whole text: the raw text verbatim, only when rungs 1–2 found no candidate
//! 4. Pattern scrape: every `text: …` / `comment: …` / `username: …`
//!    fragment, line by line
//! 5. Last resort: one comment holding the truncated raw text
//!
//! Every JSON rung shares the same structural check: an object with a
//! `comments` array. Elements keep only the known fields; absent optional
//! fields stay absent.

use crate::output::Comment;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Default length (in characters) of the last-resort comment.
pub const DEFAULT_MAX_FALLBACK_CHARS: usize = 500;

/// Which rung of the ladder produced the comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeStrategy {
    FencedBlock,
    BraceSpan,
    WholeText,
    PatternScrape,
    LastResort,
}

impl NormalizeStrategy {
    /// True for the low-confidence rungs that did not recover JSON.
    pub fn is_fallback(self) -> bool {
        matches!(
            self,
            NormalizeStrategy::PatternScrape | NormalizeStrategy::LastResort
        )
    }
}

/// Comments recovered from one raw response, with the rung that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub comments: Vec<Comment>,
    pub strategy: NormalizeStrategy,
}

type Rung = fn(&str) -> Option<Vec<Comment>>;

const LADDER: [(NormalizeStrategy, Rung); 4] = [
    (NormalizeStrategy::FencedBlock, from_fenced_block),
    (NormalizeStrategy::BraceSpan, from_brace_span),
    (NormalizeStrategy::WholeText, from_whole_text),
    (NormalizeStrategy::PatternScrape, from_labelled_lines),
];

/// Normalise raw model output into comments. Never fails.
///
/// `max_fallback_chars` bounds the text of the last-resort comment, counted
/// in characters.
pub fn normalize_response(raw: &str, max_fallback_chars: usize) -> Normalized {
    for (strategy, rung) in LADDER {
        if let Some(comments) = rung(raw) {
            debug!(
                "Normalised {} comments via {:?}",
                comments.len(),
                strategy
            );
            return Normalized { comments, strategy };
        }
    }

    debug!("No structure found; falling back to truncated raw text");
    Normalized {
        comments: vec![Comment::text_only(truncate_chars(raw, max_fallback_chars))],
        strategy: NormalizeStrategy::LastResort,
    }
}

// ── Rung 1: Fenced block ─────────────────────────────────────────────────────

static RE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n?(.*?)```").unwrap());

fn fenced_candidate(raw: &str) -> Option<&str> {
    RE_FENCE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn from_fenced_block(raw: &str) -> Option<Vec<Comment>> {
    fenced_candidate(raw).and_then(parse_candidate)
}

// ── Rung 2: Brace span ───────────────────────────────────────────────────────

fn brace_candidate(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn from_brace_span(raw: &str) -> Option<Vec<Comment>> {
    brace_candidate(raw).and_then(parse_candidate)
}

// ── Rung 3: Whole text ───────────────────────────────────────────────────────

fn from_whole_text(raw: &str) -> Option<Vec<Comment>> {
    if fenced_candidate(raw).is_some() || brace_candidate(raw).is_some() {
        return None;
    }
    parse_candidate(raw)
}

// ── Structural validation ────────────────────────────────────────────────────

fn parse_candidate(candidate: &str) -> Option<Vec<Comment>> {
    let value: Value = serde_json::from_str(candidate.trim()).ok()?;
    comments_from_value(&value)
}

/// The value must be an object whose `comments` field is an array.
/// Elements that cannot become a comment are dropped individually.
fn comments_from_value(value: &Value) -> Option<Vec<Comment>> {
    let items = value.as_object()?.get("comments")?.as_array()?;
    Some(items.iter().filter_map(coerce_comment).collect())
}

fn coerce_comment(item: &Value) -> Option<Comment> {
    match item {
        Value::String(s) if !s.trim().is_empty() => Some(Comment::text_only(s.clone())),
        Value::Object(map) => Some(Comment {
            text: field_as_string(map, "text")?,
            username: field_as_string(map, "username"),
            timestamp: field_as_string(map, "timestamp"),
            likes: field_as_string(map, "likes"),
        }),
        _ => None,
    }
}

/// Read a scalar field as a string. Blank strings, nulls and nested values
/// count as absent; numbers and booleans are stringified.
fn field_as_string(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ── Rung 4: Pattern scrape ───────────────────────────────────────────────────

/// A `label: value` fragment anywhere in a line. The value stops at a quote,
/// comma or closing brace so compact JSON yields one value per field.
static RE_LABELLED_FRAGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["']?\b(?:comment|text|username)["']?\s*:\s*"?([^"\n,}]+)"#).unwrap()
});

fn from_labelled_lines(raw: &str) -> Option<Vec<Comment>> {
    let comments: Vec<Comment> = raw
        .lines()
        .flat_map(|line| RE_LABELLED_FRAGMENT.captures_iter(line))
        .filter_map(|caps| clean_scraped_value(&caps[1]))
        .map(Comment::text_only)
        .collect();

    (!comments.is_empty()).then_some(comments)
}

fn clean_scraped_value(value: &str) -> Option<String> {
    let v = value.trim().trim_end_matches(',').trim();
    let v = v.strip_prefix('"').unwrap_or(v);
    let v = v.strip_suffix('"').unwrap_or(v).trim();

    // A bare `[` or `{` after the label is JSON structure, not a value.
    if v.is_empty() || v.chars().all(|c| matches!(c, '[' | ']' | '{' | '}' | ',')) {
        None
    } else {
        Some(v.to_string())
    }
}

// ── Rung 5: Last resort ──────────────────────────────────────────────────────

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{"comments":[
        {"username":"@ana","text":"Love this!","timestamp":"2h","likes":"12"},
        {"text":"first"}
    ]}"#;

    fn normalize(raw: &str) -> Normalized {
        normalize_response(raw, DEFAULT_MAX_FALLBACK_CHARS)
    }

    #[test]
    fn test_valid_json_recovers_all_fields() {
        let n = normalize(VALID);
        assert_eq!(n.strategy, NormalizeStrategy::BraceSpan);
        assert_eq!(n.comments.len(), 2);
        assert_eq!(
            n.comments[0],
            Comment {
                username: Some("@ana".into()),
                text: "Love this!".into(),
                timestamp: Some("2h".into()),
                likes: Some("12".into()),
            }
        );
        assert_eq!(n.comments[1], Comment::text_only("first"));
    }

    #[test]
    fn test_absent_fields_serialise_without_nulls() {
        let n = normalize(r#"{"comments":[{"text":"hi","username":null}]}"#);
        let json = serde_json::to_string(&n.comments).unwrap();
        assert_eq!(json, r#"[{"text":"hi"}]"#);
    }

    #[test]
    fn test_fenced_matches_unfenced() {
        let fenced = format!("```json\n{VALID}\n```");
        let bare = normalize(VALID);
        let n = normalize(&fenced);
        assert_eq!(n.strategy, NormalizeStrategy::FencedBlock);
        assert_eq!(n.comments, bare.comments);
    }

    #[test]
    fn test_fence_without_language_tag() {
        let n = normalize("```\n{\"comments\":[{\"text\":\"ok\"}]}\n```");
        assert_eq!(n.strategy, NormalizeStrategy::FencedBlock);
        assert_eq!(n.comments, vec![Comment::text_only("ok")]);
    }

    #[test]
    fn test_prose_preamble_uses_brace_span() {
        let raw = "Sure! Here is the data you asked for:\n{\"comments\":[{\"text\":\"wow\"}]}\nHope it helps.";
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::BraceSpan);
        assert_eq!(n.comments, vec![Comment::text_only("wow")]);
    }

    #[test]
    fn test_broken_fence_falls_through_to_brace_span() {
        let raw = "```\nnot json at all\n```\nActual answer: {\"comments\":[{\"text\":\"x\"}]}";
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::BraceSpan);
        assert_eq!(n.comments, vec![Comment::text_only("x")]);
    }

    #[test]
    fn test_whole_text_only_without_candidates() {
        // No braces and no fence: the whole text is tried and fails, so the
        // pattern scraper gets a chance.
        assert_eq!(from_whole_text("[1, 2, 3]"), None);
        assert_eq!(from_whole_text("{\"comments\":[]}"), None);
    }

    #[test]
    fn test_empty_comments_array_is_success() {
        let n = normalize(r#"{"comments": []}"#);
        assert_eq!(n.strategy, NormalizeStrategy::BraceSpan);
        assert!(n.comments.is_empty());
    }

    #[test]
    fn test_wrong_shape_falls_through() {
        // Object without a `comments` array.
        let raw = r#"{"results":[{"body":"hidden"}]}"#;
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::LastResort);
        assert_eq!(n.comments, vec![Comment::text_only(raw)]);

        let n = normalize(r#"{"results":[{"text":"hidden"}]}"#);
        assert_eq!(n.strategy, NormalizeStrategy::PatternScrape);
        assert_eq!(n.comments, vec![Comment::text_only("hidden")]);

        let n = normalize(r#"{"comments": "none"}"#);
        assert_eq!(n.strategy, NormalizeStrategy::LastResort);
    }

    #[test]
    fn test_coercion_drops_unknown_and_textless_items() {
        let raw = r#"{"comments":[
            {"text":"kept","avatar":"http://x/y.png","replies":[1,2]},
            {"username":"ghost"},
            {"text":"   "},
            "bare string comment",
            42,
            {"text":"numbers","likes":1500,"timestamp":true}
        ]}"#;
        let n = normalize(raw);
        assert_eq!(n.comments.len(), 3);
        assert_eq!(n.comments[0], Comment::text_only("kept"));
        assert_eq!(n.comments[1], Comment::text_only("bare string comment"));
        assert_eq!(n.comments[2].likes.as_deref(), Some("1500"));
        assert_eq!(n.comments[2].timestamp.as_deref(), Some("true"));
        assert_eq!(n.comments[2].username, None);
    }

    #[test]
    fn test_pattern_scrape_on_truncated_json() {
        let raw = "{\n  \"comments\": [\n    {\n      \"username\": \"bob\",\n      \"text\": \"so true\",\n    },\n    {\n      \"text\": \"cut off her";
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::PatternScrape);
        let texts: Vec<&str> = n.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["bob", "so true", "cut off her"]);
        assert!(n.comments.iter().all(|c| c.username.is_none()));
    }

    #[test]
    fn test_pattern_scrape_on_compact_truncated_json() {
        let raw = r#"{"comments":[{"username":"bob","text":"so true"},{"text":"cut off her"#;
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::PatternScrape);
        let texts: Vec<&str> = n.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["bob", "so true", "cut off her"]);
    }

    #[test]
    fn test_pattern_scrape_finds_labels_mid_sentence() {
        let raw = "The top reply reads text: great video, and another says comment: agreed";
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::PatternScrape);
        let texts: Vec<&str> = n.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["great video", "agreed"]);
    }

    #[test]
    fn test_pattern_scrape_ignores_label_lookalikes() {
        // `comments` is not a label and `context` only ends in one.
        let n = normalize(r#"Comments: none. Context: a cat photo"#);
        assert_eq!(n.strategy, NormalizeStrategy::LastResort);
    }

    #[test]
    fn test_pattern_scrape_labels_are_case_insensitive() {
        let raw = "I found these:\n- Comment: great video\nTEXT: agreed\nUsername: @zed\nlikes: 4";
        let n = normalize(raw);
        assert_eq!(n.strategy, NormalizeStrategy::PatternScrape);
        let texts: Vec<&str> = n.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["great video", "agreed", "@zed"]);
    }

    #[test]
    fn test_plain_prose_truncated_last_resort() {
        let prose = "a".repeat(800);
        let n = normalize(&prose);
        assert_eq!(n.strategy, NormalizeStrategy::LastResort);
        assert_eq!(n.comments.len(), 1);
        assert_eq!(n.comments[0].text, "a".repeat(500));
        assert_eq!(n.comments[0].username, None);
    }

    #[test]
    fn test_short_prose_kept_verbatim() {
        let raw = "The screenshot shows a cat and no comments.";
        let n = normalize(raw);
        assert_eq!(n.comments, vec![Comment::text_only(raw)]);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let raw = "é".repeat(10);
        let n = normalize_response(&raw, 3);
        assert_eq!(n.comments[0].text, "ééé");
    }

    #[test]
    fn test_empty_response_still_yields_one_comment() {
        let n = normalize("");
        assert_eq!(n.strategy, NormalizeStrategy::LastResort);
        assert_eq!(n.comments, vec![Comment::text_only("")]);
    }

    #[test]
    fn test_idempotent() {
        for raw in [VALID, "just words", "text: a\ntext: b", "```json\n{\"comments\":[]}\n```"] {
            assert_eq!(normalize(raw), normalize(raw));
        }
    }

    #[test]
    fn test_clean_scraped_value() {
        assert_eq!(clean_scraped_value("\"hello\","), Some("hello".into()));
        assert_eq!(clean_scraped_value("["), None);
        assert_eq!(clean_scraped_value("  "), None);
    }
}
