//! Metrics engines for ragprobe datasets
//!
//! Retrieval is scored with Hit Rate@k and MRR over grounded records.
//! Generation is scored by answering each question from its own chunks and
//! judging groundedness, with hallucination and false-abstention counts.

mod generation;
mod judge;
mod report;
mod retrieval;

#[cfg(test)]
mod tests;

pub use generation::{
    FailureMode, GenerationEvaluator, GenerationReport, PartitionStats, RecordGeneration, Thresholds,
    classify,
};
pub use judge::{ModelJudge, RuleJudge};
pub use report::Unevaluable;
pub use retrieval::{RecordRetrieval, RetrievalEvaluator, RetrievalReport, score_ranking};

// Re-export core types for convenience
pub use ragprobe_core::{
    Dataset, Error, GroundednessVerdict, Judge, Result, RetrievalResult, SearchService, Verdict,
};
