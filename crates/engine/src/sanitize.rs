//! Output sanitizer: never trust parsed model JSON as-is.
//!
//! Every call site has its own shape (anchors, slug lists, work blocks) and
//! gets a dedicated sanitizer. The common contract: non-conforming fields are
//! dropped, container elements are validated independently, user-facing text
//! is clamped, and a `None` result means "fall back" — never "empty success".

use crate::config::EngineCfg;
use crate::types::{Anchors, WorkBlock};
use serde_json::Value;

/// Parse raw model text as JSON. On failure, make a single best-effort
/// recovery by slicing from the first `{` to the last `}` and re-parsing.
/// A second failure is a hard failure at this layer.
pub fn salvage_json(raw: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        return Some(v);
    }
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&raw[start..=end]) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %e, "model output not salvageable as JSON");
            None
        }
    }
}

/// Trim and cut to at most `max` characters. Idempotent.
pub fn clamp_text(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    trimmed.chars().take(max).collect::<String>().trim_end().to_string()
}

/// Like `clamp_text` but marks the cut with an ellipsis, keeping the result
/// within `max` characters. Used for titles.
pub fn clamp_title(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.chars().count() <= max {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Validate a JSON value as a list of short strings: non-string elements are
/// dropped (not the whole list), each survivor is clamped, and the list is
/// capped at `max_items`. Empty and whitespace-only strings are dropped too.
fn string_items(v: Option<&Value>, max_items: usize, max_chars: usize) -> Vec<String> {
    let Some(Value::Array(items)) = v else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| item.as_str())
        .map(|s| clamp_text(s, max_chars))
        .filter(|s| !s.is_empty())
        .take(max_items)
        .collect()
}

/// Sanitize the anchors shape: five named lists of ≤6 short strings each.
/// A non-object input is a hard `None`; missing categories are just empty.
pub fn sanitize_anchors(v: &Value, cfg: &EngineCfg) -> Option<Anchors> {
    let obj = v.as_object()?;
    let per = cfg.anchors_per_category;
    // Anchor items are short, literal facts; reuse the title ceiling.
    let max_chars = cfg.title_max_chars;
    Some(Anchors {
        characters: string_items(obj.get("characters"), per, max_chars),
        places: string_items(obj.get("places"), per, max_chars),
        objects: string_items(obj.get("objects"), per, max_chars),
        beats: string_items(obj.get("beats"), per, max_chars),
        felt_words: string_items(obj.get("felt_words"), per, max_chars),
    })
}

/// Sanitize a model-proposed slug list: strings only, allow-list filtered,
/// deduplicated with first occurrence winning (order = model's ranking).
pub fn sanitize_slug_list(v: &Value, allowed: &[String]) -> Vec<String> {
    let Value::Array(items) = v else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let Some(slug) = item.as_str() else { continue };
        let slug = slug.trim();
        if slug.is_empty() {
            continue;
        }
        if !allowed.iter().any(|a| a == slug) {
            tracing::debug!(slug, "proposed slug not in allow-list, dropped");
            continue;
        }
        if out.iter().any(|s| s == slug) {
            continue;
        }
        out.push(slug.to_string());
    }
    out
}

/// Structural rejection rules for a question. Any hit invalidates the whole
/// work-block candidate; it is not partially salvaged.
pub fn question_is_malformed(q: &str) -> bool {
    if q.matches('?').count() > 1 {
        return true;
    }
    if q.matches('\n').count() >= 2 {
        return true;
    }
    // Numbered-list pattern: a line starting with "1." / "2)" etc.
    q.lines().any(|line| {
        let t = line.trim_start();
        let mut chars = t.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some(d), Some('.' | ')')) if d.is_ascii_digit()
        )
    })
}

/// Sanitize the work-block shape. `lead_in` and `question` must be strings
/// (question non-empty after trimming); `cta` is optional. A malformed
/// question rejects the whole candidate.
pub fn sanitize_work_block(v: &Value, cfg: &EngineCfg) -> Option<WorkBlock> {
    let obj = v.as_object()?;
    let question_raw = obj.get("question")?.as_str()?;
    if question_is_malformed(question_raw) {
        tracing::warn!("work block rejected: malformed question");
        return None;
    }
    let question = clamp_text(question_raw, cfg.question_max_chars);
    if question.is_empty() {
        return None;
    }
    let lead_in = obj
        .get("lead_in")
        .and_then(|l| l.as_str())
        .map(|l| clamp_text(l, cfg.lead_in_max_chars))
        .unwrap_or_default();
    let cta = obj
        .get("cta")
        .and_then(|c| c.as_str())
        .map(|c| clamp_text(c, cfg.cta_max_chars))
        .filter(|c| !c.is_empty());
    Some(WorkBlock { lead_in, question, cta })
}
