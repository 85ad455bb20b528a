//! Novelty guard: token-set similarity between a fresh question and the
//! questions we asked most recently.
//!
//! The heuristic is tuned for the Spanish working language (with English
//! function words in the stop list as a fallback); generalizing further would
//! need per-language stop lists or a language-agnostic measure.

use crate::config::EngineCfg;
use std::collections::HashSet;

/// Function words excluded from token sets. Roughly 40 Spanish entries plus
/// the most common English ones.
const STOP_WORDS: &[&str] = &[
    // es
    "que", "qué", "los", "las", "una", "uno", "unos", "unas", "del", "por",
    "para", "con", "sin", "como", "cómo", "más", "mas", "pero", "sus", "este",
    "esta", "estos", "estas", "ese", "esa", "eso", "muy", "era", "fue", "ser",
    "estar", "estaba", "hay", "había", "sobre", "entre", "cuando", "cuándo",
    "donde", "dónde", "cuál", "quién", "algo", "todo", "nada", "también",
    "porque", "desde", "hasta", "tus", "mis",
    // en
    "the", "and", "was", "were", "that", "this", "with", "for", "you", "your",
    "have", "has", "had", "not", "but", "are", "what", "when", "where", "how",
    "why", "did", "does", "been", "about",
];

/// Lower-case, strip punctuation to whitespace, collapse runs of whitespace.
/// Unicode-letter aware: accented letters survive.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Token set: words of length ≥ `cfg.min_token_chars`, stop words excluded,
/// duplicates collapsed.
pub fn tokenize(text: &str, cfg: &EngineCfg) -> HashSet<String> {
    normalize(text)
        .split_whitespace()
        .filter(|w| w.chars().count() >= cfg.min_token_chars)
        .filter(|w| !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Jaccard index of two token sets. Empty union → 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    intersection as f32 / union as f32
}

/// Whether a fresh question is a near-duplicate of recent ones.
///
/// `recent` is ordered oldest → newest; only the last `cfg.novelty_window`
/// entries are considered. Too similar means Jaccard ≥ threshold against any
/// of them, or trimmed case-insensitive equality with the immediately
/// previous question.
pub fn is_too_similar(candidate: &str, recent: &[String], cfg: &EngineCfg) -> bool {
    if let Some(previous) = recent.last() {
        if candidate.trim().to_lowercase() == previous.trim().to_lowercase() {
            return true;
        }
    }
    let cand_tokens = tokenize(candidate, cfg);
    let window_start = recent.len().saturating_sub(cfg.novelty_window);
    recent[window_start..].iter().any(|prior| {
        let sim = jaccard(&cand_tokens, &tokenize(prior, cfg));
        if sim >= cfg.novelty_threshold {
            tracing::debug!(similarity = sim, "question too similar to recent one");
            true
        } else {
            false
        }
    })
}

/// Enumerated attempt state for the generate-then-retry protocol.
/// At most two model calls: `First`, then `Retry`, then `Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retry,
    Exhausted,
}

impl Attempt {
    pub fn next(self) -> Attempt {
        match self {
            Self::First => Self::Retry,
            Self::Retry | Self::Exhausted => Self::Exhausted,
        }
    }
}
