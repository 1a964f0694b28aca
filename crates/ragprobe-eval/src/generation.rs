//! Generation metrics: fixed-context answers judged for groundedness
//!
//! Each record's question is answered by a model that sees exactly the
//! record's source chunks, with no retrieval. A judge scores the answer on a
//! 1-5 scale and the score is read against the record's grounding label.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use ragprobe_core::{
    CancelToken, Corpus, Dataset, Error, EvalConfig, GenerationRequest, Generator, GroundednessVerdict,
    Judge, JudgeRequest, Result, SyntheticRecord, Verdict, fan_out,
};

use crate::report::{Unevaluable, cancelled_records, mean, sort_unevaluable};

const ANSWER_SYSTEM_MESSAGE: &str = "\
You are a helpful assistant answering questions about internal documents.
Answer using only the CONTEXT below. Do not use outside knowledge.
If the context does not contain the answer, say that the information is not available in the provided context.";

/// How a judged answer went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Declined although the context holds the answer
    FalseAbstention,
    /// Answered a grounded question without support from the context
    UnsupportedAnswer,
    /// Made up an answer to a question the context cannot answer
    Hallucination,
}

/// Score thresholds applied to judged verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Not-grounded scores at or above this are good abstentions
    pub good_abstention: u8,
    /// Scores strictly below this are hallucinations (not grounded) or
    /// unsupported answers (grounded)
    pub hallucination: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            good_abstention: 4,
            hallucination: 3,
        }
    }
}

impl From<&EvalConfig> for Thresholds {
    fn from(config: &EvalConfig) -> Self {
        Self {
            good_abstention: config.good_abstention_threshold,
            hallucination: config.hallucination_threshold,
        }
    }
}

/// Per-record generation outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordGeneration {
    pub record_id: String,
    pub is_grounded: bool,
    pub score: u8,
    pub abstained: bool,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    pub good_abstention: bool,
    pub hallucination: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureMode>,
}

/// Counts and mean score of one grounding partition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionStats {
    pub evaluated: usize,
    pub mean_score: f64,
}

/// Aggregate generation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub grounded: PartitionStats,
    pub not_grounded: PartitionStats,
    /// Hallucinations over evaluated not-grounded records
    pub hallucination_rate: f64,
    pub hallucinations: usize,
    pub good_abstentions: usize,
    pub false_abstentions: usize,
    pub unsupported_answers: usize,
    pub records: Vec<RecordGeneration>,
    pub unevaluable: Vec<Unevaluable>,
    pub cancelled: bool,
    pub discarded: usize,
}

impl GenerationReport {
    /// Aggregate from per-record outcomes, summing in record id order
    pub fn from_records(mut records: Vec<RecordGeneration>, mut unevaluable: Vec<Unevaluable>) -> Self {
        records.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        sort_unevaluable(&mut unevaluable);

        let partition = |grounded: bool| {
            let scores: Vec<f64> = records
                .iter()
                .filter(|r| r.is_grounded == grounded)
                .map(|r| r.score as f64)
                .collect();
            PartitionStats {
                evaluated: scores.len(),
                mean_score: mean(scores.iter().sum(), scores.len()),
            }
        };
        let grounded = partition(true);
        let not_grounded = partition(false);

        let count = |mode: FailureMode| records.iter().filter(|r| r.failure == Some(mode)).count();
        let hallucinations = count(FailureMode::Hallucination);
        let false_abstentions = count(FailureMode::FalseAbstention);
        let unsupported_answers = count(FailureMode::UnsupportedAnswer);
        let good_abstentions = records.iter().filter(|r| r.good_abstention).count();

        Self {
            hallucination_rate: mean(hallucinations as f64, not_grounded.evaluated),
            grounded,
            not_grounded,
            hallucinations,
            good_abstentions,
            false_abstentions,
            unsupported_answers,
            records,
            unevaluable,
            cancelled: false,
            discarded: 0,
        }
    }
}

/// Read a judged verdict against the record's grounding label.
///
/// `Fail`, `Undetermined` and scores off the 1-5 scale cannot be classified
/// and are returned as errors so the record lands in the unevaluable bucket.
pub fn classify(record: &SyntheticRecord, verdict: GroundednessVerdict, thresholds: Thresholds) -> Result<RecordGeneration> {
    let score = match verdict.verdict {
        Verdict::Score(score) if Verdict::SCALE.contains(&score) => score,
        Verdict::Score(score) => {
            return Err(Error::Judge(format!("score {} outside the 1-5 scale", score)));
        }
        Verdict::Fail => {
            return Err(Error::Judge(format!(
                "verdict failed{}",
                verdict.reasoning.map(|r| format!(": {}", r)).unwrap_or_default()
            )));
        }
        Verdict::Undetermined => {
            return Err(Error::Judge(format!(
                "verdict undetermined{}",
                verdict.reasoning.map(|r| format!(": {}", r)).unwrap_or_default()
            )));
        }
    };

    let below = score < thresholds.hallucination;
    let (good_abstention, hallucination, failure) = if record.is_grounded() {
        let failure = if verdict.abstained {
            Some(FailureMode::FalseAbstention)
        } else if below {
            Some(FailureMode::UnsupportedAnswer)
        } else {
            None
        };
        (false, false, failure)
    } else {
        (
            score >= thresholds.good_abstention,
            below,
            below.then_some(FailureMode::Hallucination),
        )
    };

    Ok(RecordGeneration {
        record_id: record.id.clone(),
        is_grounded: record.is_grounded(),
        score,
        abstained: verdict.abstained,
        answer: verdict.answer,
        reasoning: verdict.reasoning,
        good_abstention,
        hallucination,
        failure,
    })
}

/// Answers every record from its own chunks and judges the answers
#[derive(Clone)]
pub struct GenerationEvaluator {
    answerer: Arc<dyn Generator>,
    judge: Arc<dyn Judge>,
    corpus: Arc<Corpus>,
    thresholds: Thresholds,
    concurrency: usize,
}

impl GenerationEvaluator {
    pub fn new(answerer: Arc<dyn Generator>, judge: Arc<dyn Judge>, corpus: Arc<Corpus>) -> Self {
        Self {
            answerer,
            judge,
            corpus,
            thresholds: Thresholds::default(),
            concurrency: 10,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fixed-context answer: the model sees exactly `context` and the question
    pub async fn answer(&self, question: &str, context: &[String]) -> Result<String> {
        let context_text = context
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        let request = GenerationRequest::new(
            ANSWER_SYSTEM_MESSAGE,
            format!("# CONTEXT:\n{}\n\n# QUESTION:\n{}\n", context_text, question),
        )
        .with_temperature(0.0);

        self.answerer.generate(&request).await.map_err(|e| match e {
            Error::Generation(_) => e,
            other => Error::Generation(other.to_string()),
        })
    }

    pub async fn evaluate_record(&self, record: &SyntheticRecord) -> Result<RecordGeneration> {
        if record.source_chunk_ids.is_empty() {
            return Err(Error::InvalidInput("record has no source chunks".to_string()));
        }
        let context = self.corpus.texts(&record.source_chunk_ids)?;
        let answer = self.answer(&record.question, &context).await?;

        let verdict = self
            .judge
            .score(&JudgeRequest {
                question: &record.question,
                answer: &answer,
                context: &context,
                expected_answer: &record.expected_answer,
                is_grounded: record.is_grounded(),
            })
            .await
            .map_err(|e| match e {
                Error::Judge(_) => e,
                other => Error::Judge(other.to_string()),
            })?;

        classify(record, verdict, self.thresholds)
    }

    /// Evaluate every record, grounded and not grounded
    pub async fn evaluate(&self, dataset: &Dataset, cancel: &CancelToken) -> GenerationReport {
        info!(
            records = dataset.len(),
            model = self.answerer.model_id(),
            "evaluating generation"
        );

        let records: Vec<SyntheticRecord> = dataset.iter().cloned().collect();
        let record_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let out = fan_out(records, self.concurrency, cancel, |record| {
            let this = self.clone();
            async move {
                let result = this.evaluate_record(&record).await;
                (record.id, result)
            }
        })
        .await;

        let cancelled = out.cancelled;
        let mut unevaluable = cancelled_records(&record_ids, &out.discarded);
        let discarded = out.discarded.len();
        let mut scored = Vec::new();
        for (record_id, result) in out.into_results() {
            match result {
                Ok(outcome) => scored.push(outcome),
                Err(e) => {
                    warn!(record_id = %record_id, "generation unevaluable: {}", e);
                    unevaluable.push(Unevaluable::new(record_id, e.to_string()));
                }
            }
        }

        let mut report = GenerationReport::from_records(scored, unevaluable);
        report.cancelled = cancelled;
        report.discarded = discarded;

        info!(
            grounded = report.grounded.evaluated,
            not_grounded = report.not_grounded.evaluated,
            unevaluable = report.unevaluable.len(),
            hallucination_rate = report.hallucination_rate,
            "generation evaluation finished"
        );
        report
    }
}
