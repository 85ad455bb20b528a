//! Fixed-size direction recommendation for the initial panel.

use crate::config::EngineCfg;
use crate::error::EngineError;
use crate::prompt;
use crate::safety::{self, SafetyLexicon};
use crate::sanitize;
use crate::selector;
use crate::types::{RecommendResponse, SafetyValue, SynthFlags};
use reverie_llm::provider::LlmProvider;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub allowed_slugs: Vec<String>,
    #[serde(default)]
    pub caller_safety: SafetyValue,
}

pub(crate) async fn run(
    provider: &dyn LlmProvider,
    cfg: &EngineCfg,
    lexicon: &SafetyLexicon,
    req: RecommendRequest,
) -> Result<RecommendResponse, EngineError> {
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

    let combined = safety::combine(req.caller_safety, safety::classify(&req.narrative, lexicon));
    if !combined.is_safe() {
        return Ok(RecommendResponse {
            slugs: Vec::new(),
            flags: SynthFlags { safety: combined, too_short: false },
        });
    }
    if req.narrative.trim().chars().count() < cfg.min_narrative_chars {
        return Ok(RecommendResponse {
            slugs: Vec::new(),
            flags: SynthFlags { safety: SafetyValue::None, too_short: true },
        });
    }

    let raw = provider
        .generate(prompt::recommend_request(&req.narrative, &allowed))
        .await?;
    let value = sanitize::salvage_json(&raw)
        .ok_or(EngineError::InvalidModelOutput("recommendation not parseable as JSON"))?;
    let proposed = value
        .get("slugs")
        .map(|v| sanitize::sanitize_slug_list(v, &allowed))
        .unwrap_or_default();

    Ok(RecommendResponse {
        slugs: selector::select_recommended(&proposed, &allowed, cfg),
        flags: SynthFlags { safety: SafetyValue::None, too_short: false },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reverie_llm::provider::MockProvider;
    use serde_json::json;

    const NARRATIVE: &str =
        "Soñé que volvía al colegio de mi infancia y todas las puertas estaban cerradas con llave.";

    fn request() -> RecommendRequest {
        RecommendRequest {
            narrative: NARRATIVE.into(),
            allowed_slugs: vec!["emociones".into(), "simbolos".into(), "memoria".into(), "cuerpo".into()],
            caller_safety: SafetyValue::None,
        }
    }

    async fn run_with(response: &str, req: RecommendRequest) -> Result<RecommendResponse, EngineError> {
        let provider = MockProvider::new(response);
        run(&provider, &EngineCfg::default(), &SafetyLexicon::default(), req).await
    }

    #[tokio::test]
    async fn returns_exactly_three_ranked_slugs() {
        let response = json!({"slugs": ["memoria", "simbolos", "emociones"]}).to_string();
        let resp = run_with(&response, request()).await.unwrap();
        assert_eq!(resp.slugs, vec!["memoria", "simbolos", "emociones"]);
    }

    #[tokio::test]
    async fn short_list_is_topped_up_in_allowed_order() {
        let response = json!({"slugs": ["memoria"]}).to_string();
        let resp = run_with(&response, request()).await.unwrap();
        assert_eq!(resp.slugs, vec!["memoria", "emociones", "simbolos"]);
    }

    #[tokio::test]
    async fn all_invalid_slugs_degrade_to_single_fallback() {
        let response = json!({"slugs": ["invented", "also-invented"]}).to_string();
        let resp = run_with(&response, request()).await.unwrap();
        assert_eq!(resp.slugs, vec!["emociones"]);
    }

    #[tokio::test]
    async fn unsafe_narrative_yields_empty_panel() {
        let mut req = request();
        req.narrative =
            "Soñé con el accidente otra vez y ya no sé si fue real o lo estoy imaginando.".into();
        let resp = run_with("{\"slugs\": []}", req).await.unwrap();
        assert!(resp.slugs.is_empty());
        assert_eq!(resp.flags.safety, SafetyValue::RealityConfusion);
    }

    #[tokio::test]
    async fn too_short_narrative_is_flagged_empty() {
        let mut req = request();
        req.narrative = "Un sueño.".into();
        let resp = run_with("{\"slugs\": []}", req).await.unwrap();
        assert!(resp.slugs.is_empty());
        assert!(resp.flags.too_short);
    }

    #[tokio::test]
    async fn missing_allowed_slugs_is_client_error() {
        let mut req = request();
        req.allowed_slugs = vec![];
        assert!(run_with("{}", req).await.unwrap_err().is_client_error());
    }

    #[tokio::test]
    async fn unparseable_output_is_upstream_failure() {
        let err = run_with("no json at all", request()).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidModelOutput(_)));
        assert!(!err.is_client_error());
    }
}
