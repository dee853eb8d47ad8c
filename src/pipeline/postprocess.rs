//! Deterministic cleanup of model replies.
//!
//! Even well-prompted models wrap their output in code fences, emit `\r\n`
//! line endings or sprinkle zero-width characters through Thai text. The
//! rules here undo that without touching content.
//!
//! Two entry points, one per collaborator:
//!
//! * [`clean_markdown`] — stage 1 page text before it is stitched into the
//!   parsed document.
//! * [`strip_json_fences`] — stage 2 reply before it is parsed as JSON.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all Markdown cleanup rules to one page of model output.
///
/// Rules (applied in order):
/// 1. Strip outer ```` ```markdown ```` fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Trim trailing whitespace per line
/// 4. Collapse 3+ consecutive blank lines down to 2
/// 5. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 6. End with exactly one newline
pub fn clean_markdown(input: &str) -> String {
    let s = strip_outer_fences(input, &RE_MARKDOWN_FENCES);
    let s = normalise_line_endings(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    ensure_final_newline(&s)
}

/// Remove a ```` ```json ```` (or bare ```` ``` ````) fence around a reply.
///
/// Replies without a fence are returned trimmed. When the model adds prose
/// around the object, the outermost `{ ... }` span is returned instead.
pub fn strip_json_fences(reply: &str) -> String {
    let unfenced = strip_outer_fences(reply, &RE_JSON_FENCES);
    let trimmed = unfenced.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => trimmed[start..=end].to_string(),
        _ => trimmed.to_string(),
    }
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_MARKDOWN_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

static RE_JSON_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_outer_fences(input: &str, fence: &Regex) -> String {
    match fence.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 4: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 5: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 6: Single final newline ─────────────────────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed)
    }
}
