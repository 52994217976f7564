//! Narration: grouping script lines into utterances and speaking them

pub mod player;
pub mod unit;

pub use player::{
    Completion, CompletionCallback, CompletionRouter, NarrationPlayer, SpeechError, SpeechOutcome,
    SpeechRequest, SpeechSynthesizer, SpeechTicket,
};
pub use unit::{collect_group, compose_text, NarrationUnit, Placeholders};
