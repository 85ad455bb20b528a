use serde::{Deserialize, Serialize};

/// All engine tunables. One immutable value, passed by reference into each
/// component, so tests can vary thresholds without touching globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCfg {
    // novelty guard
    pub novelty_threshold: f32,
    /// How many recent questions a fresh one is compared against.
    pub novelty_window: usize,
    /// Tokens shorter than this are ignored by the similarity measure.
    pub min_token_chars: usize,

    // history
    /// Callers truncate history to this many turns; the engine re-truncates.
    pub history_window: usize,
    /// Trimmed answer length at or below which an answer counts as "brief".
    pub brief_answer_max_chars: usize,

    // direction selection
    pub candidates_min: usize,
    pub candidates_max: usize,
    pub recommended_count: usize,
    pub allowed_slugs_cap: usize,

    // synthesis
    pub anchors_per_category: usize,
    pub prior_echo_cap: usize,
    pub echo_matched_items_cap: usize,
    /// Narratives shorter than this are flagged `too_short` and skip selection.
    pub min_narrative_chars: usize,

    // user-facing text ceilings
    pub lead_in_max_chars: usize,
    pub question_max_chars: usize,
    pub cta_max_chars: usize,
    pub summary_max_chars: usize,
    pub title_max_chars: usize,
}

impl Default for EngineCfg {
    fn default() -> Self {
        Self {
            novelty_threshold: 0.72,
            novelty_window: 2,
            min_token_chars: 3,
            history_window: 4,
            brief_answer_max_chars: 30,
            candidates_min: 3,
            candidates_max: 5,
            recommended_count: 3,
            allowed_slugs_cap: 10,
            anchors_per_category: 6,
            prior_echo_cap: 2,
            echo_matched_items_cap: 2,
            min_narrative_chars: 40,
            lead_in_max_chars: 280,
            question_max_chars: 160,
            cta_max_chars: 120,
            summary_max_chars: 800,
            title_max_chars: 72,
        }
    }
}

impl EngineCfg {
    /// Build from environment, falling back to defaults per key.
    /// Keys are the field names upper-cased with a `REVERIE_` prefix,
    /// e.g. `REVERIE_NOVELTY_THRESHOLD`.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            novelty_threshold: env_or("REVERIE_NOVELTY_THRESHOLD", d.novelty_threshold),
            novelty_window: env_or("REVERIE_NOVELTY_WINDOW", d.novelty_window),
            min_token_chars: env_or("REVERIE_MIN_TOKEN_CHARS", d.min_token_chars),
            history_window: env_or("REVERIE_HISTORY_WINDOW", d.history_window),
            brief_answer_max_chars: env_or("REVERIE_BRIEF_ANSWER_MAX_CHARS", d.brief_answer_max_chars),
            candidates_min: env_or("REVERIE_CANDIDATES_MIN", d.candidates_min),
            candidates_max: env_or("REVERIE_CANDIDATES_MAX", d.candidates_max),
            recommended_count: env_or("REVERIE_RECOMMENDED_COUNT", d.recommended_count),
            allowed_slugs_cap: env_or("REVERIE_ALLOWED_SLUGS_CAP", d.allowed_slugs_cap),
            anchors_per_category: env_or("REVERIE_ANCHORS_PER_CATEGORY", d.anchors_per_category),
            prior_echo_cap: env_or("REVERIE_PRIOR_ECHO_CAP", d.prior_echo_cap),
            echo_matched_items_cap: env_or("REVERIE_ECHO_MATCHED_ITEMS_CAP", d.echo_matched_items_cap),
            min_narrative_chars: env_or("REVERIE_MIN_NARRATIVE_CHARS", d.min_narrative_chars),
            lead_in_max_chars: env_or("REVERIE_LEAD_IN_MAX_CHARS", d.lead_in_max_chars),
            question_max_chars: env_or("REVERIE_QUESTION_MAX_CHARS", d.question_max_chars),
            cta_max_chars: env_or("REVERIE_CTA_MAX_CHARS", d.cta_max_chars),
            summary_max_chars: env_or("REVERIE_SUMMARY_MAX_CHARS", d.summary_max_chars),
            title_max_chars: env_or("REVERIE_TITLE_MAX_CHARS", d.title_max_chars),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
