//! Keyword-based safety gate.
//!
//! Deliberately conservative and auditable: lower-case the narrative, test
//! substring membership against two fixed phrase lists (working language +
//! English), first match wins. No scoring, no ML.

use crate::types::SafetyValue;

/// Fixed phrase lists. A struct rather than free constants so tests (and a
/// future per-language pass) can substitute their own.
#[derive(Debug, Clone)]
pub struct SafetyLexicon {
    pub self_harm: Vec<&'static str>,
    pub reality_confusion: Vec<&'static str>,
}

impl Default for SafetyLexicon {
    fn default() -> Self {
        Self {
            self_harm: vec![
                // es
                "hacerme daño",
                "quiero hacerme daño",
                "quitarme la vida",
                "no quiero vivir",
                "no quiero seguir viviendo",
                "desaparecer para siempre",
                "me quiero morir",
                "suicidarme",
                "suicidio",
                "lastimarme",
                "cortarme",
                // en
                "kill myself",
                "hurt myself",
                "end my life",
                "want to die",
                "self harm",
                "self-harm",
                "suicide",
                "suicidal",
            ],
            reality_confusion: vec![
                // es
                "no sé si fue un sueño",
                "no se si fue un sueño",
                "no sé si fue real",
                "no se si fue real",
                "creo que fue real",
                "sigue pasando ahora",
                "no puedo distinguir",
                "no era un sueño",
                "las voces me siguen",
                // en
                "wasn't a dream",
                "was not a dream",
                "can't tell if it was real",
                "cannot tell if it was real",
                "still happening now",
                "it was real",
                "the voices follow me",
            ],
        }
    }
}

/// Classify raw narrative text. Order is fixed: self-harm wins over
/// reality-confusion, which wins over none.
pub fn classify(text: &str, lexicon: &SafetyLexicon) -> SafetyValue {
    let lower = text.to_lowercase();
    if lexicon.self_harm.iter().any(|kw| lower.contains(kw)) {
        return SafetyValue::SelfHarm;
    }
    if lexicon.reality_confusion.iter().any(|kw| lower.contains(kw)) {
        return SafetyValue::RealityConfusion;
    }
    SafetyValue::None
}

/// OR a caller-asserted flag with the locally derived classification.
/// When the caller flag is non-none its label is taken verbatim, even if the
/// local detector picked a different category.
pub fn combine(caller: SafetyValue, local: SafetyValue) -> SafetyValue {
    if !caller.is_safe() { caller } else { local }
}
