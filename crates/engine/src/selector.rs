//! Direction / recommendation selection.
//!
//! Both call sites share the allow-list + dedup rules; the candidates path
//! additionally backfills deterministically so that total model failure still
//! yields a schema-valid, non-empty result (at the cost of relevance).

use crate::config::EngineCfg;

/// Ordered keyword groups for backfill affinity, tried in this sequence
/// against slug text. Themes mirror the catalog's usual vocabulary.
const KEYWORD_GROUPS: &[&[&str]] = &[
    &["emocion", "sentir", "feeling", "emotion"],
    &["simbolo", "imagen", "symbol", "image"],
    &["cuerpo", "somatic", "body", "sensacion"],
    &["memoria", "recuerdo", "memory"],
    &["accion", "paso", "action", "step"],
];

/// Filter model-proposed slugs: allow-list membership, dedup with first
/// occurrence winning (order is the model's ranking).
fn filter_allowed(proposed: &[String], allowed: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for slug in proposed {
        if !allowed.iter().any(|a| a == slug) {
            continue;
        }
        if out.iter().any(|s| s == slug) {
            continue;
        }
        out.push(slug.clone());
    }
    out
}

/// Fill `out` from `allowed` by keyword affinity, then raw allowed order,
/// until `min` entries or the allow-list is exhausted.
fn backfill(out: &mut Vec<String>, allowed: &[String], min: usize) {
    for group in KEYWORD_GROUPS {
        if out.len() >= min {
            return;
        }
        for slug in allowed {
            if out.len() >= min {
                return;
            }
            if out.iter().any(|s| s == slug) {
                continue;
            }
            let lower = slug.to_lowercase();
            if group.iter().any(|kw| lower.contains(kw)) {
                out.push(slug.clone());
            }
        }
    }
    for slug in allowed {
        if out.len() >= min {
            return;
        }
        if !out.iter().any(|s| s == slug) {
            out.push(slug.clone());
        }
    }
}

/// Candidates path: 3 to 5 ranked slugs, backfilled to the minimum.
/// Callers must gate on safety/too-short BEFORE calling; selection never
/// runs on unsafe or insufficient input.
pub fn select_candidates(
    proposed: &[String],
    allowed: &[String],
    cfg: &EngineCfg,
) -> Vec<String> {
    let mut out = filter_allowed(proposed, allowed);
    out.truncate(cfg.candidates_max);
    if out.len() < cfg.candidates_min {
        backfill(&mut out, allowed, cfg.candidates_min);
    }
    out
}

/// Fixed-3 recommender path. Survivors are topped up in allowed-list order;
/// zero survivors degrade to the first allowed slug rather than failing, so
/// the caller never renders an empty recommendation panel.
pub fn select_recommended(
    proposed: &[String],
    allowed: &[String],
    cfg: &EngineCfg,
) -> Vec<String> {
    let mut out = filter_allowed(proposed, allowed);
    out.truncate(cfg.recommended_count);
    if out.is_empty() {
        return allowed.first().cloned().into_iter().collect();
    }
    if out.len() < cfg.recommended_count {
        for slug in allowed {
            if out.len() >= cfg.recommended_count {
                break;
            }
            if !out.iter().any(|s| s == slug) {
                out.push(slug.clone());
            }
        }
    }
    out
}
