//! Generation job pipeline.
//!
//! Turns a free-text request into persisted concepts and phrasings via
//! the external generation service, in bounded, resumable steps.

mod dispatch;
mod parser;
mod prompts;
mod runner;

pub use dispatch::StepDispatcher;
pub use parser::{
    parse_concept_candidates, parse_phrasing_candidates, ConceptCandidate, ParsedPhrasings,
    PhrasingCandidate,
};
pub use runner::{JobRunner, StepOutcome};
