//! Stop-criteria evaluator.
//!
//! A small state machine over the active direction's stop rules and the
//! bounded recent history. Evaluation order is fixed and short-circuiting:
//! max_cards → repetition → brief_streak. Reasons are mutually exclusive per
//! evaluation.

use crate::config::EngineCfg;
use crate::types::{HistoryItem, StopCriteria};

/// Machine-readable reason a dialogue should end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    MaxCards,
    Repetition,
    UserBriefStreak,
    LowNovelty,
    Safety,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxCards => "max_cards",
            Self::Repetition => "repetition",
            Self::UserBriefStreak => "user_brief_streak",
            Self::LowNovelty => "low_novelty",
            Self::Safety => "safety",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "max_cards" => Some(Self::MaxCards),
            "repetition" => Some(Self::Repetition),
            "user_brief_streak" => Some(Self::UserBriefStreak),
            "low_novelty" => Some(Self::LowNovelty),
            "safety" => Some(Self::Safety),
            _ => None,
        }
    }
}

/// Evaluate the direction's stop rules against recent history.
/// Returns the first matching reason, or `None` to continue the dialogue.
pub fn evaluate(
    criteria: &StopCriteria,
    history: &[HistoryItem],
    cfg: &EngineCfg,
) -> Option<StopReason> {
    if criteria.max_cards > 0 && history.len() as u32 >= criteria.max_cards {
        return Some(StopReason::MaxCards);
    }

    if criteria.stop_if_repetition_detected && history.len() >= 2 {
        let a = &history[history.len() - 2];
        let b = &history[history.len() - 1];
        if a.question == b.question && a.answer == b.answer {
            return Some(StopReason::Repetition);
        }
    }

    let streak = criteria.stop_if_user_brief_streak as usize;
    if streak > 0 {
        let answers: Vec<&str> = history
            .iter()
            .filter_map(|h| h.answer.as_deref())
            .collect();
        if answers.len() >= streak
            && answers[answers.len() - streak..]
                .iter()
                .all(|a| a.trim().chars().count() <= cfg.brief_answer_max_chars)
        {
            return Some(StopReason::UserBriefStreak);
        }
    }

    None
}
