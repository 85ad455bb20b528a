//! Synthesis pipeline: anchors + candidate directions + question seed.
//!
//! Everything here is recomputed per request and never cached; durability of
//! the result belongs to the external store.

use crate::config::EngineCfg;
use crate::error::EngineError;
use crate::novelty;
use crate::prompt;
use crate::safety::{self, SafetyLexicon};
use crate::sanitize;
use crate::selector;
use crate::types::{
    Anchors, EchoUse, PriorEcho, QuestionSeed, SafetyValue, SynthFlags, SynthesisResponse,
};
use reverie_llm::provider::LlmProvider;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisRequest {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub allowed_slugs: Vec<String>,
    #[serde(default)]
    pub prior_echoes: Vec<PriorEcho>,
    #[serde(default)]
    pub caller_safety: SafetyValue,
}

fn empty_response(flags: SynthFlags) -> SynthesisResponse {
    SynthesisResponse {
        anchors: Anchors::default(),
        candidate_directions: Vec::new(),
        question_seed: QuestionSeed::default(),
        prior_echoes_used: Vec::new(),
        flags,
    }
}

pub(crate) async fn run(
    provider: &dyn LlmProvider,
    cfg: &EngineCfg,
    lexicon: &SafetyLexicon,
    req: SynthesisRequest,
) -> Result<SynthesisResponse, EngineError> {
    if req.narrative.trim().is_empty() {
        return Err(EngineError::MissingField("narrative"));
    }
    if req.allowed_slugs.is_empty() {
        return Err(EngineError::MissingField("allowed_slugs"));
    }
    let allowed: Vec<String> = req
        .allowed_slugs
        .iter()
        .take(cfg.allowed_slugs_cap)
        .cloned()
        .collect();
    let echoes: Vec<PriorEcho> = req
        .prior_echoes
        .iter()
        .take(cfg.prior_echo_cap)
        .map(|e| PriorEcho {
            session_id: e.session_id,
            anchor_summary: sanitize::clamp_text(&e.anchor_summary, cfg.summary_max_chars),
            created_at: e.created_at,
        })
        .collect();

    // unsafe input: all generation yields empty results, never runs selection
    let combined = safety::combine(req.caller_safety, safety::classify(&req.narrative, lexicon));
    if !combined.is_safe() {
        return Ok(empty_response(SynthFlags { safety: combined, too_short: false }));
    }
    if req.narrative.trim().chars().count() < cfg.min_narrative_chars {
        return Ok(empty_response(SynthFlags {
            safety: SafetyValue::None,
            too_short: true,
        }));
    }

    let raw = provider
        .generate(prompt::synthesis_request(&req.narrative, &allowed, &echoes))
        .await?;
    let value = sanitize::salvage_json(&raw)
        .ok_or(EngineError::InvalidModelOutput("synthesis not parseable as JSON"))?;

    let anchors = value
        .get("anchors")
        .and_then(|a| sanitize::sanitize_anchors(a, cfg))
        .ok_or(EngineError::InvalidModelOutput("anchors failed validation"))?;

    let proposed = value
        .get("candidate_directions")
        .map(|v| sanitize::sanitize_slug_list(v, &allowed))
        .unwrap_or_default();
    let candidate_directions = selector::select_candidates(&proposed, &allowed, cfg);

    let question_seed = seed_from(&value, &anchors, cfg);
    let prior_echoes_used = match_echoes(&echoes, &anchors, cfg);

    Ok(SynthesisResponse {
        anchors,
        candidate_directions,
        question_seed,
        prior_echoes_used,
        flags: SynthFlags { safety: SafetyValue::None, too_short: false },
    })
}

/// Question seed from model output, with deterministic fallbacks: style
/// defaults to "open", the target anchor must actually be an extracted
/// anchor (else the first one, if any).
fn seed_from(value: &serde_json::Value, anchors: &Anchors, cfg: &EngineCfg) -> QuestionSeed {
    let seed = value.get("question_seed");
    let preferred_style = seed
        .and_then(|s| s.get("preferred_style"))
        .and_then(|s| s.as_str())
        .map(|s| sanitize::clamp_text(s, cfg.title_max_chars))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "open".to_string());
    let proposed_target = seed
        .and_then(|s| s.get("target_anchor"))
        .and_then(|s| s.as_str())
        .map(str::trim);
    let target_anchor = match proposed_target {
        Some(t) if anchors.all_items().any(|item| item == t) => Some(t.to_string()),
        _ => anchors.all_items().next().cloned(),
    };
    QuestionSeed { preferred_style, target_anchor }
}

/// Match each echo's summary against the extracted anchors by token overlap.
/// Echoes with no overlapping anchor items are omitted.
fn match_echoes(echoes: &[PriorEcho], anchors: &Anchors, cfg: &EngineCfg) -> Vec<EchoUse> {
    echoes
        .iter()
        .filter_map(|echo| {
            let summary_tokens = novelty::tokenize(&echo.anchor_summary, cfg);
            let matched: Vec<String> = anchors
                .all_items()
                .filter(|item| {
                    let item_tokens = novelty::tokenize(item, cfg);
                    !item_tokens.is_disjoint(&summary_tokens)
                })
                .take(cfg.echo_matched_items_cap)
                .cloned()
                .collect();
            if matched.is_empty() {
                None
            } else {
                Some(EchoUse { session_id: echo.session_id, matched_items: matched })
            }
        })
        .collect()
}
