//! Prompt builders for every model call site.
//!
//! The direction sent to the model is a reduced, field-limited view: only
//! what affects question style and focus goes into the prompt.

use crate::types::{Direction, HistoryItem, PriorEcho};
use reverie_llm::provider::GenerateRequest;
use serde::Serialize;

const CARD_SYSTEM: &str = "Eres una guía de reflexión sobre sueños. Trabajas con el relato tal \
    como fue contado, sin inventar hechos ni interpretar por la persona. Haz exactamente UNA \
    pregunta abierta, breve y concreta. Responde SOLO con un objeto JSON: \
    {\"lead_in\": string, \"question\": string, \"cta\": string|null}. \
    Sin listas numeradas, sin saltos de línea dentro de los campos.";

const SYNTHESIS_SYSTEM: &str = "Extraes anclas literales de un relato de sueño y propones \
    direcciones de exploración. Responde SOLO con un objeto JSON: \
    {\"anchors\": {\"characters\": [], \"places\": [], \"objects\": [], \"beats\": [], \
    \"felt_words\": []}, \"candidate_directions\": [slug...], \
    \"question_seed\": {\"preferred_style\": string, \"target_anchor\": string|null}}. \
    Máximo 6 elementos por categoría, 3 a 5 slugs, solo slugs de la lista permitida.";

const RECOMMEND_SYSTEM: &str = "Eliges las 3 direcciones de exploración más afines a un relato \
    de sueño. Responde SOLO con un objeto JSON: {\"slugs\": [slug, slug, slug]}. \
    Solo slugs de la lista permitida, ordenados por relevancia.";

const TITLE_SYSTEM: &str = "Pones un título corto y evocador a un relato de sueño, en el idioma \
    del relato. Responde SOLO con el título en texto plano, sin comillas, máximo 8 palabras.";

/// The field-limited view of a Direction that goes into prompts.
#[derive(Debug, Clone, Serialize)]
pub struct DirectionBrief {
    pub slug: String,
    pub title: String,
    pub micro_description: String,
    pub question_style: String,
    pub focus_model: Option<String>,
}

impl DirectionBrief {
    pub fn from_direction(d: &Direction) -> Self {
        Self {
            slug: d.slug.clone(),
            title: d.title.clone(),
            micro_description: d.micro_description.clone(),
            question_style: d.method_spec.question_style.clone(),
            focus_model: d.focus_model.clone(),
        }
    }
}

fn push_echoes(prompt: &mut String, echoes: &[PriorEcho]) {
    if echoes.is_empty() {
        return;
    }
    prompt.push_str("\n## Ecos de sesiones anteriores (contexto opcional)\n");
    for echo in echoes {
        prompt.push_str("- ");
        prompt.push_str(&echo.anchor_summary);
        prompt.push('\n');
    }
}

fn push_history(prompt: &mut String, history: &[HistoryItem]) {
    if history.is_empty() {
        return;
    }
    prompt.push_str("\n## Turnos recientes\n");
    for item in history {
        prompt.push_str("P: ");
        prompt.push_str(&item.question);
        prompt.push('\n');
        if let Some(answer) = &item.answer {
            prompt.push_str("R: ");
            prompt.push_str(answer);
            prompt.push('\n');
        }
    }
}

/// Build the next-question request. On retry, `forbidden` names the prior
/// questions the model must move away from.
pub fn question_request(
    narrative: &str,
    history: &[HistoryItem],
    direction: &DirectionBrief,
    echoes: &[PriorEcho],
    forbidden: Option<&[String]>,
) -> GenerateRequest {
    let mut prompt = String::new();
    prompt.push_str("## Relato\n");
    prompt.push_str(narrative);
    prompt.push('\n');

    prompt.push_str("\n## Dirección activa\n");
    // serialization of the brief cannot fail: plain strings only
    if let Ok(json) = serde_json::to_string(direction) {
        prompt.push_str(&json);
        prompt.push('\n');
    }

    push_history(&mut prompt, history);
    push_echoes(&mut prompt, echoes);

    if let Some(forbidden) = forbidden {
        prompt.push_str("\n## IMPORTANTE: cambia de foco\n");
        prompt.push_str(
            "Tu pregunta anterior era casi idéntica a una ya hecha. NO repitas ni reformules estas preguntas:\n",
        );
        for q in forbidden {
            prompt.push_str("- ");
            prompt.push_str(q);
            prompt.push('\n');
        }
        prompt.push_str("Elige otro ancla del relato y pregunta sobre algo aún no tocado.\n");
    }

    prompt.push_str("\nGenera la siguiente carta.");
    let mut req = GenerateRequest::new(CARD_SYSTEM, prompt);
    req.max_tokens = 512;
    req
}

/// Build the synthesis request (anchors + candidate directions).
pub fn synthesis_request(
    narrative: &str,
    allowed_slugs: &[String],
    echoes: &[PriorEcho],
) -> GenerateRequest {
    let mut prompt = String::new();
    prompt.push_str("## Relato\n");
    prompt.push_str(narrative);
    prompt.push('\n');
    prompt.push_str("\n## Slugs permitidos\n");
    prompt.push_str(&allowed_slugs.join(", "));
    prompt.push('\n');
    push_echoes(&mut prompt, echoes);
    prompt.push_str("\nExtrae las anclas y propone direcciones.");
    let mut req = GenerateRequest::new(SYNTHESIS_SYSTEM, prompt);
    req.max_tokens = 768;
    req.temperature = 0.4;
    req
}

/// Build the fixed-3 recommendation request.
pub fn recommend_request(narrative: &str, allowed_slugs: &[String]) -> GenerateRequest {
    let mut prompt = String::new();
    prompt.push_str("## Relato\n");
    prompt.push_str(narrative);
    prompt.push('\n');
    prompt.push_str("\n## Slugs permitidos\n");
    prompt.push_str(&allowed_slugs.join(", "));
    prompt.push_str("\n\nElige las 3 direcciones más afines.");
    let mut req = GenerateRequest::new(RECOMMEND_SYSTEM, prompt);
    req.max_tokens = 256;
    req.temperature = 0.3;
    req
}

/// Build the title request.
pub fn title_request(narrative: &str) -> GenerateRequest {
    let mut req = GenerateRequest::new(
        TITLE_SYSTEM,
        format!("## Relato\n{narrative}\n\nPon un título."),
    );
    req.max_tokens = 64;
    req.temperature = 0.8;
    req
}
