use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Safety classification of a narrative.
/// Once non-`None`, every downstream generation/selection step must yield
/// empty or closure output, no matter which side detected it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyValue {
    #[default]
    None,
    SelfHarm,
    RealityConfusion,
    Other,
}

impl SafetyValue {
    pub fn is_safe(self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SelfHarm => "self_harm",
            Self::RealityConfusion => "reality_confusion",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "none" => Self::None,
            "self_harm" => Self::SelfHarm,
            "reality_confusion" => Self::RealityConfusion,
            _ => Self::Other,
        }
    }
}

/// One prior dialogue turn: the question we asked and what the user answered.
/// Ordered oldest → newest; the engine only ever looks at the tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub question: String,
    pub answer: Option<String>,
}

impl HistoryItem {
    pub fn new(question: impl Into<String>, answer: Option<&str>) -> Self {
        Self {
            question: question.into(),
            answer: answer.map(|a| a.to_string()),
        }
    }
}

/// Compact signal from a different past session. Read-only context for the
/// model; the engine never authors these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorEcho {
    pub session_id: Uuid,
    pub anchor_summary: String,
    pub created_at: DateTime<Utc>,
}

/// Per-direction stop rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StopCriteria {
    #[serde(default)]
    pub max_cards: u32,
    #[serde(default)]
    pub stop_if_user_brief_streak: u32,
    #[serde(default)]
    pub stop_if_repetition_detected: bool,
}

/// How the direction wants its questions phrased.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodSpec {
    #[serde(default)]
    pub question_style: String,
    #[serde(default)]
    pub tone: Option<String>,
}

/// Catalog entry describing one exploration strategy. Immutable per dialogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Direction {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub micro_description: String,
    #[serde(default)]
    pub method_spec: MethodSpec,
    #[serde(default)]
    pub stop_criteria: StopCriteria,
    #[serde(default)]
    pub output_spec: Option<Value>,
    #[serde(default)]
    pub safety: Option<Value>,
    #[serde(default)]
    pub focus_model: Option<String>,
    #[serde(default)]
    pub selection_hints: Vec<String>,
}

impl Direction {
    /// Resolve the nested-vs-flat catalog shape in one place.
    ///
    /// Callers may hand us either the entry itself or `{"content": {entry}}`;
    /// the wrapper wins only when it actually carries a slug.
    pub fn from_value(v: &Value) -> Option<Direction> {
        let inner = match v.get("content") {
            Some(content) if content.get("slug").is_some() => content,
            _ => v,
        };
        inner.get("slug")?;
        serde_json::from_value(inner.clone()).ok()
    }
}

/// Anchor facts extracted from the narrative, ≤6 short strings per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchors {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub places: Vec<String>,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub beats: Vec<String>,
    #[serde(default)]
    pub felt_words: Vec<String>,
}

impl Anchors {
    /// All items across the five categories, in category order.
    pub fn all_items(&self) -> impl Iterator<Item = &String> {
        self.characters
            .iter()
            .chain(self.places.iter())
            .chain(self.objects.iter())
            .chain(self.beats.iter())
            .chain(self.felt_words.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.all_items().next().is_none()
    }
}

// ── Output shapes ───────────────────────────────────────────────

/// One unit of dialogue output. Final once emitted, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkBlock {
    pub lead_in: String,
    pub question: String,
    pub cta: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopSignal {
    pub suggest_stop: bool,
    pub reason: Option<String>,
}

impl StopSignal {
    pub fn none() -> Self {
        Self { suggest_stop: false, reason: None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CardFlags {
    pub safety: SafetyValue,
}

/// The card payload returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardResponse {
    pub work_block: WorkBlock,
    pub stop_signal: StopSignal,
    pub flags: CardFlags,
}

/// Seed hint for the next question generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSeed {
    pub preferred_style: String,
    pub target_anchor: Option<String>,
}

/// Which prior echo contributed, and through which anchor items (≤2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoUse {
    pub session_id: Uuid,
    pub matched_items: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SynthFlags {
    pub safety: SafetyValue,
    pub too_short: bool,
}

/// Synthesis payload: anchors + candidate directions + seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResponse {
    pub anchors: Anchors,
    pub candidate_directions: Vec<String>,
    pub question_seed: QuestionSeed,
    pub prior_echoes_used: Vec<EchoUse>,
    pub flags: SynthFlags,
}

/// Fixed-3 recommendation payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub slugs: Vec<String>,
    pub flags: SynthFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safety_value_roundtrip() {
        let values = [
            (SafetyValue::None, "none"),
            (SafetyValue::SelfHarm, "self_harm"),
            (SafetyValue::RealityConfusion, "reality_confusion"),
            (SafetyValue::Other, "other"),
        ];
        for (v, s) in &values {
            assert_eq!(v.as_str(), *s);
            assert_eq!(SafetyValue::parse(s), *v);
        }
        assert_eq!(SafetyValue::parse("garbage"), SafetyValue::Other);
    }

    #[test]
    fn safety_value_serde_uses_snake_case() {
        let json = serde_json::to_string(&SafetyValue::SelfHarm).unwrap();
        assert_eq!(json, "\"self_harm\"");
    }

    #[test]
    fn direction_from_flat_value() {
        let v = json!({
            "slug": "simbolos",
            "title": "Símbolos",
            "micro_description": "Explora imágenes del sueño",
            "stop_criteria": {"max_cards": 5, "stop_if_repetition_detected": true}
        });
        let d = Direction::from_value(&v).unwrap();
        assert_eq!(d.slug, "simbolos");
        assert_eq!(d.stop_criteria.max_cards, 5);
        assert!(d.stop_criteria.stop_if_repetition_detected);
    }

    #[test]
    fn direction_from_content_wrapped_value() {
        let v = json!({
            "content": {
                "slug": "cuerpo",
                "method_spec": {"question_style": "somatic"}
            }
        });
        let d = Direction::from_value(&v).unwrap();
        assert_eq!(d.slug, "cuerpo");
        assert_eq!(d.method_spec.question_style, "somatic");
    }

    #[test]
    fn direction_wrapper_without_slug_falls_through() {
        // "content" present but not a catalog entry → the outer object wins
        let v = json!({
            "content": {"note": "not a direction"},
            "slug": "emociones"
        });
        let d = Direction::from_value(&v).unwrap();
        assert_eq!(d.slug, "emociones");
    }

    #[test]
    fn direction_without_slug_is_rejected() {
        assert!(Direction::from_value(&json!({"title": "sin slug"})).is_none());
        assert!(Direction::from_value(&json!("just a string")).is_none());
    }

    #[test]
    fn anchors_all_items_in_category_order() {
        let a = Anchors {
            characters: vec!["mi hermana".into()],
            places: vec!["bosque".into()],
            objects: vec![],
            beats: vec!["corrí".into()],
            felt_words: vec!["miedo".into()],
        };
        let items: Vec<&str> = a.all_items().map(|s| s.as_str()).collect();
        assert_eq!(items, vec!["mi hermana", "bosque", "corrí", "miedo"]);
        assert!(!a.is_empty());
        assert!(Anchors::default().is_empty());
    }
}
