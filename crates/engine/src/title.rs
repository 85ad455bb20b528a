//! Session title generation. Best effort with a deterministic fallback;
//! this path never fails the caller.

use crate::config::EngineCfg;
use crate::prompt;
use crate::sanitize;
use reverie_llm::provider::LlmProvider;

const FALLBACK_WORDS: usize = 8;

/// One model call plus one retry; any failure or unusable output falls back
/// to a title derived from the narrative's opening words.
pub(crate) async fn run(provider: &dyn LlmProvider, cfg: &EngineCfg, narrative: &str) -> String {
    for attempt in 0..2 {
        match provider.generate(prompt::title_request(narrative)).await {
            Ok(raw) => {
                if let Some(title) = clean(&raw, cfg) {
                    return title;
                }
                tracing::debug!(attempt, "title output unusable, retrying");
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "title generation failed");
            }
        }
    }
    fallback(narrative, cfg)
}

/// First non-empty line, surrounding quotes stripped, clamped. `None` when
/// nothing usable remains.
fn clean(raw: &str, cfg: &EngineCfg) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .trim_matches(|c| c == '"' || c == '“' || c == '”' || c == '«' || c == '»')
        .trim();
    if line.is_empty() {
        return None;
    }
    Some(sanitize::clamp_title(line, cfg.title_max_chars))
}

fn fallback(narrative: &str, cfg: &EngineCfg) -> String {
    let opening = narrative
        .split_whitespace()
        .take(FALLBACK_WORDS)
        .collect::<Vec<_>>()
        .join(" ");
    let opening = opening.trim_end_matches(['.', ',', ';', ':']);
    if opening.is_empty() {
        return "Sueño sin título".to_string();
    }
    sanitize::clamp_title(opening, cfg.title_max_chars)
}
