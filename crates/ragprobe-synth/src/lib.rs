//! Synthetic evaluation data for ragprobe
//!
//! This crate draws control parameters, prompts a generation service with an
//! anchor chunk and its neighbors, and turns the structured replies into
//! labeled grounded / not-grounded records. It also validates the resulting
//! dataset for length outliers, category balance and near-duplicates.

mod params;
mod prompt;
mod synthesizer;
mod validator;
mod verify;


pub use params::ParameterSampler;
pub use prompt::{GeneratedPair, PromptBuilder, parse_generated_pair};
pub use synthesizer::{
    SynthesisFailure, SynthesisOutcome, SynthesisRequest, Synthesizer, plan_requests,
};
pub use validator::{
    CheckResult, DatasetValidator, FilteredRecord, ValidationReport, ValidationWarning,
    filter_flagged, jaccard_similarity,
};
pub use verify::{Answerability, UnanswerabilityCheck};

// Re-export core types for convenience
pub use ragprobe_core::{
    ControlParams, Dataset, Dimension, Error, Result, SyntheticRecord, ValidatorConfig,
    Vocabularies, Vocabulary,
};
