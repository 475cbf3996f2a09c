//! Response-to-action parsing.
//!
//! Turns free model text into an executable fragment. Recognizers are tried
//! in a fixed order and the first one that yields code wins:
//!
//! 1. fenced (` ``` `/` ```py `/` ```python `) or `<code>`-tagged blocks
//! 2. an opening fence or `<code>` tag that is never closed
//! 3. the text after a `Code:` label
//! 4. the last balanced literal call to the terminal tool
//! 5. fallback: the whole text submitted as the terminal tool's argument
//!
//! Parsing is total: every input yields a non-empty fragment.

use once_cell::sync::Lazy;
use regex::Regex;

use matscout_contracts::execution::ActionStrategy;

/// The terminal tool name the parser falls back to.
pub const FINAL_ANSWER: &str = "final_answer";

const END_MARKERS: &[&str] = &["<end_action>", "<end_code>"];

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:python|py)?[ \t]*\n(.*?)```").expect("fence pattern is valid")
});

static TAGGED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<code>(.*?)</code>").expect("tag pattern is valid"));

static OPEN_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(?:```(?:python|py)?[ \t]*\n|<code>)(.*)$").expect("open fence pattern is valid")
});

static CODE_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)Code:\s*(?:```(?:py|python)?\n)?(.*?)(?:```|$)").expect("label pattern is valid")
});

static QUOTED_ANSWER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"final_answer\(\s*(?:answer\s*=\s*)?(?:'((?:[^'\\\n]|\\.)*)'|"((?:[^"\\\n]|\\.)*)")\s*\)"#,
    )
    .expect("answer pattern is valid")
});

/// An executable fragment and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAction {
    /// The code to execute.
    pub code: String,
    /// The canonical `<code>…</code><end_action>` form of `code`.
    pub rendered: String,
    pub strategy: ActionStrategy,
}

impl ParsedAction {
    fn new(code: String, strategy: ActionStrategy) -> Self {
        let rendered = format!("<code>\n{}\n</code>\n<end_action>", code);
        Self { code, rendered, strategy }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionParser;

impl ActionParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str) -> ParsedAction {
        let mut text = text.replace("\r\n", "\n");
        for marker in END_MARKERS {
            text = text.replace(marker, "");
        }

        // ── Delimited blocks ─────────────────────────────────────────────────
        let fenced: Vec<String> = FENCED_BLOCK
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| clean_block(m.as_str()))
            .filter(|code| !code.is_empty())
            .collect();
        if !fenced.is_empty() {
            return ParsedAction::new(fenced.join("\n\n"), ActionStrategy::CodeBlock);
        }

        let tagged: Vec<String> = TAGGED_BLOCK
            .captures_iter(&text)
            .filter_map(|c| c.get(1))
            .map(|m| clean_block(m.as_str()))
            .filter(|code| !code.is_empty())
            .collect();
        if !tagged.is_empty() {
            return ParsedAction::new(tagged.join("\n\n"), ActionStrategy::CodeBlock);
        }

        if let Some(code) = OPEN_FENCE
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| clean_block(&m.as_str().replace("</code>", "")))
            .filter(|code| !code.is_empty())
        {
            return ParsedAction::new(code, ActionStrategy::UnterminatedBlock);
        }

        // ── Labeled section ──────────────────────────────────────────────────
        if let Some(code) = CODE_LABEL
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| clean_block(&m.as_str().replace("</code>", "")))
            .filter(|code| !code.is_empty())
        {
            return ParsedAction::new(code, ActionStrategy::LabeledSection);
        }

        // ── Literal terminal call ────────────────────────────────────────────
        if let Some(call) = last_balanced_call(&text, FINAL_ANSWER) {
            return ParsedAction::new(call.to_string(), ActionStrategy::LiteralCall);
        }

        // ── Fallback ─────────────────────────────────────────────────────────
        let code = format!("{}('{}')", FINAL_ANSWER, escape_single_quoted(text.trim()));
        ParsedAction::new(code, ActionStrategy::Fallback)
    }
}

/// Trim surrounding blank lines and trailing whitespace, keeping the first
/// line's indentation.
fn clean_block(block: &str) -> String {
    block.trim_start_matches(['\n', '\r']).trim_end().to_string()
}

fn escape_single_quoted(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n").replace('\'', "\\'")
}

/// The last `name(...)` call in `text` whose parentheses balance, quotes
/// respected.
fn last_balanced_call<'t>(text: &'t str, name: &str) -> Option<&'t str> {
    let opener = format!("{}(", name);
    let starts: Vec<usize> = text.match_indices(&opener).map(|(i, _)| i).collect();

    for &start in starts.iter().rev() {
        let preceded_by_ident = text[..start]
            .chars()
            .next_back()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false);
        if preceded_by_ident {
            continue;
        }

        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        for (offset, c) in text[start + name.len()..].char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = start + name.len() + offset + 1;
                        return Some(&text[start..end]);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// The string argument of the last `final_answer('…')` or
/// `final_answer("…")` call in `text`, unescaped.
///
/// Returns `None` when there is no such call or its argument is not a single
/// quoted string literal.
pub fn extract_final_answer(text: &str) -> Option<String> {
    let captures = QUOTED_ANSWER.captures_iter(text).last()?;
    let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
    Some(unescape(raw))
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
