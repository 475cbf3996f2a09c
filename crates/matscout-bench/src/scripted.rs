//! Offline stand-ins for the model and the text search services.
//!
//! `ScriptedBackend` replays canned replies in order and then repeats a
//! fallback reply. `CannedSearch` answers queries from a keyword table.
//! Both let the whole harness run without network access.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use tracing::debug;

use matscout_contracts::{
    conversation::{ChatMessage, Completion, GenerationOptions, TokenUsage},
    error::{HarnessError, HarnessResult},
};
use matscout_core::traits::{ChatBackend, TextSearch};

/// Reply used once the script is exhausted: prints a line and answers.
pub const SMOKE_REPLY: &str = "Thought: I will print a greeting and then call final_answer.\n\
<code>\n\
print('hello')\n\
final_answer('done')\n\
</code>";

/// Marker line separating replies in a script file.
pub const SCRIPT_SEPARATOR: &str = "---";

// ── ScriptedBackend ───────────────────────────────────────────────────────────

pub struct ScriptedBackend {
    replies: Mutex<VecDeque<String>>,
    fallback: String,
    /// Every conversation the backend was sent, in call order.
    seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: SMOKE_REPLY.to_string(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A backend that always gives `SMOKE_REPLY`.
    pub fn smoke() -> Self {
        Self::new(Vec::<String>::new())
    }

    /// Parse a script: replies separated by lines holding only `---`.
    /// Blank replies are dropped.
    pub fn from_script(script: &str) -> Self {
        let mut replies = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in script.lines() {
            if line.trim() == SCRIPT_SEPARATOR {
                replies.push(current.join("\n"));
                current.clear();
            } else {
                current.push(line);
            }
        }
        replies.push(current.join("\n"));
        Self::new(replies.into_iter().filter(|r| !r.trim().is_empty()))
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// Shared handle to the conversations received so far.
    pub fn seen(&self) -> Arc<Mutex<Vec<Vec<ChatMessage>>>> {
        Arc::clone(&self.seen)
    }

    /// Replies still queued before the fallback takes over.
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl ChatBackend for ScriptedBackend {
    fn complete(&self, messages: &[ChatMessage], _options: &GenerationOptions) -> HarnessResult<Completion> {
        let poisoned = || HarnessError::ModelCall {
            reason: "scripted backend lock poisoned".to_string(),
        };
        self.seen.lock().map_err(|_| poisoned())?.push(messages.to_vec());

        let text = self
            .replies
            .lock()
            .map_err(|_| poisoned())?
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        debug!(chars = text.len(), "scripted reply");

        Ok(Completion {
            text,
            usage: TokenUsage { input_tokens: 1, output_tokens: 5 },
        })
    }
}

// ── CannedSearch ──────────────────────────────────────────────────────────────

/// Keyword-keyed text search. A query returns every entry whose keyword it
/// contains (case-insensitively), in insertion order.
#[derive(Debug, Clone, Default)]
pub struct CannedSearch {
    entries: Vec<(String, String)>,
}

impl CannedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, keyword: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.push((keyword.into().to_lowercase(), text.into()));
        self
    }

    /// Encyclopedia-style summaries for the standard design grid.
    pub fn encyclopedia() -> Self {
        Self::new()
            .with_entry("cutting board", "A material commonly used in cutting boards is wood.")
            .with_entry(
                "grip",
                "Kitchen utensil grips are usually moulded from silicone rubber, wood, or heat-resistant polymers.",
            )
            .with_entry(
                "helmet",
                "Safety helmets combine a hard outer shell of polycarbonate or ABS with an energy-absorbing foam liner.",
            )
            .with_entry(
                "underwater",
                "Underwater components are made from corrosion-resistant alloys such as stainless steel, titanium, and copper-nickel.",
            )
            .with_entry(
                "spacecraft",
                "Spacecraft structures favour aluminium alloys, titanium, and carbon-fibre composites for their strength-to-weight ratio.",
            )
    }

    /// Preprint-abstract style summaries for the standard design grid.
    pub fn archive() -> Self {
        Self::new()
            .with_entry(
                "helmet",
                "Impact tests show multi-layer polymer shells reduce peak head acceleration compared with single-layer shells.",
            )
            .with_entry(
                "corrosion",
                "Copper alloys form a passive oxide film in seawater, limiting long-term corrosion rates.",
            )
            .with_entry(
                "spacecraft",
                "Aluminium-lithium alloys cut structural mass of launch vehicles by up to ten percent.",
            )
    }
}

impl TextSearch for CannedSearch {
    fn search(&self, query: &str) -> HarnessResult<String> {
        let query = query.to_lowercase();
        let hits: Vec<&str> = self
            .entries
            .iter()
            .filter(|(keyword, _)| query.contains(keyword.as_str()))
            .map(|(_, text)| text.as_str())
            .collect();
        if hits.is_empty() {
            Ok(format!("No results found for '{}'.", query))
        } else {
            Ok(hits.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use matscout_contracts::conversation::Role;

    use super::*;

    fn ask(backend: &ScriptedBackend) -> String {
        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];
        backend.complete(&messages, &GenerationOptions::default()).unwrap().text
    }

    #[test]
    fn replies_play_in_order_then_fall_back() {
        let backend = ScriptedBackend::new(["one", "two"]);
        assert_eq!(ask(&backend), "one");
        assert_eq!(ask(&backend), "two");
        assert_eq!(ask(&backend), SMOKE_REPLY, "an exhausted script repeats the fallback");
        assert_eq!(backend.seen().lock().unwrap().len(), 3);
    }

    #[test]
    fn script_files_split_on_separator_lines() {
        let backend = ScriptedBackend::from_script("first\nline\n---\n\n---\nsecond\n");
        assert_eq!(backend.remaining(), 2, "blank replies are dropped");
        assert_eq!(ask(&backend), "first\nline");
        assert_eq!(ask(&backend), "second");
    }

    #[test]
    fn custom_fallback() {
        let backend = ScriptedBackend::smoke().with_fallback("Thought: again");
        assert_eq!(ask(&backend), "Thought: again");
    }

    #[test]
    fn poisoned_history_is_a_model_call_error() {
        let backend = ScriptedBackend::new(["one"]);
        let seen = backend.seen();
        let _ = std::thread::spawn(move || {
            let _guard = seen.lock().unwrap();
            panic!("poison the history lock");
        })
        .join();

        let messages = vec![ChatMessage { role: Role::User, content: "hi".into() }];
        match backend.complete(&messages, &GenerationOptions::default()) {
            Err(HarnessError::ModelCall { reason }) => assert!(reason.contains("poisoned"), "got: {reason}"),
            other => panic!("expected ModelCall, got {:?}", other),
        }
        assert_eq!(backend.remaining(), 1, "no reply is consumed by a failed call");
    }

    #[test]
    fn canned_search_matches_keywords() {
        let search = CannedSearch::encyclopedia();
        let hit = search.search("Materials for a SAFETY HELMET").unwrap();
        assert!(hit.contains("polycarbonate"), "got: {hit}");

        let miss = search.search("bridge cables").unwrap();
        assert_eq!(miss, "No results found for 'bridge cables'.");
    }

    #[test]
    fn canned_search_joins_every_hit() {
        let search = CannedSearch::new().with_entry("steel", "A").with_entry("pan", "B");
        assert_eq!(search.search("steel pan").unwrap(), "A\n\nB");
    }
}
