//! Voice assistant: intent patterns, scoring, response templates and the
//! interaction loop that ties them to the microphone and speaker

mod interaction;
mod patterns;
mod scoring;
mod template;

pub use interaction::{
    CycleReport, CycleSettings, CycleState, InteractionLoop, Services, TriggerHandle,
    TriggerOutcome,
};
pub use patterns::{FALLBACK_PATTERN, IntentPattern, PatternSet};
pub use scoring::{score, scores, select_pattern, tokenize};
pub use template::{NAME_PLACEHOLDER, Placeholders, Rendered, compose_response, placeholders, render};
