//! Spoken step instructions.
//!
//! Builds the text read aloud for a step and decides whether it has to be
//! translated before it reaches the speech engine. Every narration carries a
//! [`NarrationTicket`]; only the newest ticket may still produce speech.

use crate::{Recipe, Step, VoiceLanguage};
use serde::Serialize;

/// Identifies one narration request; a newer ticket makes older ones stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NarrationTicket(pub u64);

/// Compose the text spoken for a step
///
/// Steps with linked ingredients get a preamble listing what is needed.
pub fn compose_narration(recipe: &Recipe, step: &Step) -> String {
    let needed: Vec<String> = recipe
        .linked_ingredients(step)
        .iter()
        .map(|ing| ing.describe())
        .collect();

    if needed.is_empty() {
        step.instruction.clone()
    } else {
        format!(
            "For this step, you will need: {}. {}",
            needed.join(", "),
            step.instruction
        )
    }
}

/// How a composed narration reaches the speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrationPlan {
    /// Speak the text as-is
    Speak { text: String, speech_tag: String },
    /// Translate into `target_language` first, then speak with `speech_tag`
    TranslateThenSpeak {
        text: String,
        target_language: String,
        speech_tag: String,
    },
}

/// Decide how to narrate `text` in `language`; `None` when the language is silent
pub fn plan_narration(text: String, language: VoiceLanguage) -> Option<NarrationPlan> {
    let speech_tag = language.speech_tag()?.to_string();
    match language.translate_name() {
        Some(target) if language.needs_translation() => Some(NarrationPlan::TranslateThenSpeak {
            text,
            target_language: target.to_string(),
            speech_tag,
        }),
        _ => Some(NarrationPlan::Speak { text, speech_tag }),
    }
}
