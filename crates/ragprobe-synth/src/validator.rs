//! Statistical quality checks over a synthesized dataset
//!
//! The validator is advisory: it reports what it finds and never mutates or
//! gates the dataset. `filter_flagged` produces a filtered copy on request.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

use ragprobe_core::{
    CancelToken, Dataset, Dimension, Embedder, Error, SyntheticRecord, ValidatorConfig, Vocabularies,
    cosine_similarity, fan_out,
};

const NO_EMBEDDING: &str = "no question embedding";

/// A non-fatal anomaly found by the validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    EmptyQuestion {
        record_id: String,
    },
    QuestionLength {
        record_id: String,
        words: usize,
        min: usize,
        max: usize,
    },
    AnswerLength {
        record_id: String,
        words: usize,
        min: usize,
        max: usize,
    },
    Imbalance {
        dimension: Dimension,
        value: String,
        observed: f64,
        expected: f64,
    },
    Duplicate {
        record_id: String,
        duplicate_of: String,
        similarity: f64,
    },
    /// The record could not take part in the duplicate scan
    Unchecked {
        record_id: String,
        reason: String,
    },
}

impl ValidationWarning {
    /// Record this warning is about, for record-level warnings
    pub fn record_id(&self) -> Option<&str> {
        match self {
            ValidationWarning::EmptyQuestion { record_id }
            | ValidationWarning::QuestionLength { record_id, .. }
            | ValidationWarning::AnswerLength { record_id, .. }
            | ValidationWarning::Duplicate { record_id, .. }
            | ValidationWarning::Unchecked { record_id, .. } => Some(record_id),
            ValidationWarning::Imbalance { .. } => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ValidationWarning::EmptyQuestion { .. } => "Empty question".to_string(),
            ValidationWarning::QuestionLength { words, min, max, .. } => {
                format!("Question length {} words outside [{}, {}]", words, min, max)
            }
            ValidationWarning::AnswerLength { words, min, max, .. } => {
                format!("Answer length {} words outside [{}, {}]", words, min, max)
            }
            ValidationWarning::Imbalance {
                dimension,
                value,
                observed,
                expected,
            } => format!(
                "{} '{}' observed {:.3}, expected {:.3}",
                dimension, value, observed, expected
            ),
            ValidationWarning::Duplicate {
                duplicate_of,
                similarity,
                ..
            } => format!("Duplicate of {} (similarity {:.3})", duplicate_of, similarity),
            ValidationWarning::Unchecked { reason, .. } => format!("Not checked for duplicates: {}", reason),
        }
    }
}

/// Pass/fail outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    /// Ids of the records that caused the failure
    pub offending: Vec<String>,
}

/// Structured result of validating a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total: usize,
    pub checks: Vec<CheckResult>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn check(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|c| c.name == name)
    }
}

/// A record removed by `filter_flagged`, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredRecord {
    #[serde(flatten)]
    pub record: SyntheticRecord,
    pub filtered_reason: String,
}

/// Checks length bounds, category balance and near-duplicate questions
pub struct DatasetValidator {
    config: ValidatorConfig,
    vocabularies: Option<Vocabularies>,
}

impl DatasetValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self {
            config,
            vocabularies: None,
        }
    }

    /// Compare categorical balance against the vocabularies' weights
    /// instead of a uniform split over observed values
    pub fn with_vocabularies(mut self, vocabularies: Vocabularies) -> Self {
        self.vocabularies = Some(vocabularies);
        self
    }

    /// Validate with word-set (Jaccard) similarity for duplicates
    pub fn validate(&self, dataset: &Dataset) -> ValidationReport {
        let duplicates = self.duplicates_by(dataset, |a, b| {
            jaccard_similarity(&a.question, &b.question)
        });
        self.report(dataset, duplicates)
    }

    /// Validate with cosine similarity of question embeddings for duplicates.
    ///
    /// Records without an embedding cannot be compared; each gets an
    /// `Unchecked` warning and the duplicates check fails.
    pub fn validate_with_embeddings(
        &self,
        dataset: &Dataset,
        embeddings: &HashMap<String, Vec<f32>>,
    ) -> ValidationReport {
        self.embedding_report(dataset, embeddings, &HashMap::new())
    }

    /// Embed every question, then validate with embedding duplicates.
    ///
    /// Failed or cancelled embedding calls leave the record unchecked, with
    /// the cause in its warning.
    pub async fn validate_embedded(
        &self,
        dataset: &Dataset,
        embedder: Arc<dyn Embedder>,
        concurrency: usize,
        cancel: &CancelToken,
    ) -> ValidationReport {
        let questions: Vec<(String, String)> = dataset
            .iter()
            .map(|r| (r.id.clone(), r.question.clone()))
            .collect();
        let ids: Vec<String> = questions.iter().map(|(id, _)| id.clone()).collect();
        info!(records = questions.len(), concurrency, "embedding questions");

        let out = fan_out(questions, concurrency, cancel, |(id, question)| {
            let embedder = Arc::clone(&embedder);
            async move {
                let embedding = embedder.embed(&question).await;
                (id, embedding)
            }
        })
        .await;

        let mut reasons: HashMap<String, String> = out
            .discarded
            .iter()
            .filter_map(|&i| ids.get(i))
            .map(|id| (id.clone(), Error::Cancelled.to_string()))
            .collect();
        let mut embeddings = HashMap::new();
        for (id, result) in out.into_results() {
            match result {
                Ok(vector) => {
                    embeddings.insert(id, vector);
                }
                Err(e) => {
                    warn!(record_id = %id, "embedding failed: {}", e);
                    reasons.insert(id, e.to_string());
                }
            }
        }

        self.embedding_report(dataset, &embeddings, &reasons)
    }

    fn embedding_report(
        &self,
        dataset: &Dataset,
        embeddings: &HashMap<String, Vec<f32>>,
        reasons: &HashMap<String, String>,
    ) -> ValidationReport {
        let mut duplicates = self.duplicates_by(dataset, |a, b| {
            match (embeddings.get(&a.id), embeddings.get(&b.id)) {
                (Some(x), Some(y)) => cosine_similarity(x, y) as f64,
                _ => 0.0,
            }
        });
        duplicates.extend(
            dataset
                .iter()
                .filter(|r| !embeddings.contains_key(&r.id))
                .map(|r| ValidationWarning::Unchecked {
                    record_id: r.id.clone(),
                    reason: reasons
                        .get(&r.id)
                        .cloned()
                        .unwrap_or_else(|| NO_EMBEDDING.to_string()),
                }),
        );
        self.report(dataset, duplicates)
    }

    fn report(&self, dataset: &Dataset, duplicates: Vec<ValidationWarning>) -> ValidationReport {
        let mut checks = Vec::new();
        let mut warnings = Vec::new();

        let (question_warnings, answer_warnings) = self.length_warnings(dataset);
        checks.push(check_from("question_length", &question_warnings));
        checks.push(check_from("answer_length", &answer_warnings));
        warnings.extend(question_warnings);
        warnings.extend(answer_warnings);

        for dimension in Dimension::all() {
            let (check, imbalance) = self.balance(dataset, dimension);
            checks.push(check);
            warnings.extend(imbalance);
        }

        checks.push(check_from("duplicates", &duplicates));
        warnings.extend(duplicates);

        let report = ValidationReport {
            total: dataset.len(),
            checks,
            warnings,
        };

        if report.passed() {
            info!(records = report.total, "dataset validation passed");
        } else {
            let failed: Vec<_> = report
                .checks
                .iter()
                .filter(|c| !c.passed)
                .map(|c| c.name.as_str())
                .collect();
            warn!(records = report.total, ?failed, "dataset validation found problems");
        }
        report
    }

    fn length_warnings(&self, dataset: &Dataset) -> (Vec<ValidationWarning>, Vec<ValidationWarning>) {
        let c = &self.config;
        let mut questions = Vec::new();
        let mut answers = Vec::new();

        for record in dataset {
            let q_words = word_count(&record.question);
            if q_words == 0 {
                questions.push(ValidationWarning::EmptyQuestion {
                    record_id: record.id.clone(),
                });
            } else if q_words < c.min_question_words || q_words > c.max_question_words {
                questions.push(ValidationWarning::QuestionLength {
                    record_id: record.id.clone(),
                    words: q_words,
                    min: c.min_question_words,
                    max: c.max_question_words,
                });
            }

            let a_words = word_count(&record.expected_answer);
            if a_words < c.min_answer_words || a_words > c.max_answer_words {
                answers.push(ValidationWarning::AnswerLength {
                    record_id: record.id.clone(),
                    words: a_words,
                    min: c.min_answer_words,
                    max: c.max_answer_words,
                });
            }
        }

        (questions, answers)
    }

    fn expected_distribution(&self, dataset: &Dataset, dimension: Dimension) -> BTreeMap<String, f64> {
        if dimension == Dimension::IsGrounded {
            let ratio = self.config.expected_grounded_ratio;
            return BTreeMap::from([("true".to_string(), ratio), ("false".to_string(), 1.0 - ratio)]);
        }

        if let Some(vocab) = self
            .vocabularies
            .as_ref()
            .and_then(|v| v.for_dimension(dimension))
        {
            return vocab.expected_frequencies().into_iter().collect();
        }

        let observed: BTreeSet<String> = dataset.iter().map(|r| r.params.value(dimension)).collect();
        let share = 1.0 / observed.len().max(1) as f64;
        observed.into_iter().map(|v| (v, share)).collect()
    }

    fn balance(&self, dataset: &Dataset, dimension: Dimension) -> (CheckResult, Vec<ValidationWarning>) {
        let name = format!("balance:{}", dimension);
        if dataset.is_empty() {
            return (
                CheckResult {
                    name,
                    passed: true,
                    offending: Vec::new(),
                },
                Vec::new(),
            );
        }

        let total = dataset.len() as f64;
        let mut members: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for record in dataset {
            members
                .entry(record.params.value(dimension))
                .or_default()
                .push(record.id.as_str());
        }

        let mut expected = self.expected_distribution(dataset, dimension);
        for value in members.keys() {
            expected.entry(value.clone()).or_insert(0.0);
        }

        let mut warnings = Vec::new();
        let mut offending = Vec::new();
        for (value, expected_share) in expected {
            let ids = members.get(&value).map(Vec::as_slice).unwrap_or(&[]);
            let observed = ids.len() as f64 / total;
            if (observed - expected_share).abs() > self.config.balance_tolerance {
                offending.extend(ids.iter().map(|id| id.to_string()));
                warnings.push(ValidationWarning::Imbalance {
                    dimension,
                    value,
                    observed,
                    expected: expected_share,
                });
            }
        }

        (
            CheckResult {
                name,
                passed: warnings.is_empty(),
                offending,
            },
            warnings,
        )
    }

    /// Pairwise duplicate scan; the first occurrence is kept, later ones are flagged
    fn duplicates_by<F>(&self, dataset: &Dataset, similarity: F) -> Vec<ValidationWarning>
    where
        F: Fn(&SyntheticRecord, &SyntheticRecord) -> f64,
    {
        let records = dataset.records();
        let mut flagged = vec![false; records.len()];
        let mut warnings = Vec::new();

        for i in 0..records.len() {
            if flagged[i] {
                continue;
            }
            for j in (i + 1)..records.len() {
                if flagged[j] {
                    continue;
                }
                let score = similarity(&records[i], &records[j]);
                if score >= self.config.duplicate_threshold {
                    flagged[j] = true;
                    warnings.push(ValidationWarning::Duplicate {
                        record_id: records[j].id.clone(),
                        duplicate_of: records[i].id.clone(),
                        similarity: score,
                    });
                }
            }
        }

        warnings
    }
}

fn check_from(name: &str, warnings: &[ValidationWarning]) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        passed: warnings.is_empty(),
        offending: warnings
            .iter()
            .filter_map(|w| w.record_id().map(str::to_string))
            .collect(),
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the lower-cased word sets of two texts
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let a = word_set(a);
    let b = word_set(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    intersection / union
}

/// Split a dataset by the record-level warnings of a report.
///
/// Balance warnings concern the whole dataset and unchecked records were
/// never found faulty; neither removes records. The input is left untouched.
pub fn filter_flagged(dataset: &Dataset, report: &ValidationReport) -> (Dataset, Vec<FilteredRecord>) {
    let mut reasons: HashMap<&str, String> = HashMap::new();
    for warning in &report.warnings {
        if matches!(warning, ValidationWarning::Unchecked { .. }) {
            continue;
        }
        if let Some(id) = warning.record_id() {
            reasons.entry(id).or_insert_with(|| warning.describe());
        }
    }

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for record in dataset {
        match reasons.get(record.id.as_str()) {
            Some(reason) => rejected.push(FilteredRecord {
                record: record.clone(),
                filtered_reason: reason.clone(),
            }),
            None => accepted.push(record.clone()),
        }
    }

    (Dataset::new(accepted), rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragprobe_core::{ControlParams, Result, Vocabulary};

    fn record(id: &str, question: &str, grounded: bool, difficulty: &str) -> SyntheticRecord {
        SyntheticRecord {
            id: id.to_string(),
            question: question.to_string(),
            expected_answer: "An answer.".to_string(),
            explanation: String::new(),
            anchor_chunk_id: "c".to_string(),
            source_chunk_ids: vec!["c".to_string()],
            params: ControlParams {
                difficulty: difficulty.to_string(),
                tone: "formal".to_string(),
                language: "English".to_string(),
                domain: "general".to_string(),
                topic: "general".to_string(),
                question_length: 8,
                is_grounded: grounded,
            },
        }
    }

    fn questions() -> Vec<&'static str> {
        vec![
            "How many vacation days do new employees receive per year?",
            "Which form must be filed to request parental leave?",
            "What is the deadline for submitting travel expense reports?",
            "Who approves overtime for part-time staff members?",
            "Where are the building evacuation maps posted for visitors?",
            "When does the annual performance review cycle start?",
            "What happens to unused sick days at the end of the year?",
            "How do contractors get access to the internal wiki?",
            "Which insurance plans cover dental work for dependents?",
            "What is the policy on remote work from another country?",
        ]
    }

    fn balanced_dataset(grounded_count: usize) -> Dataset {
        questions()
            .into_iter()
            .enumerate()
            .map(|(i, q)| {
                let difficulty = if i % 2 == 0 { "easy" } else { "hard" };
                record(&format!("r{}", i), q, i < grounded_count, difficulty)
            })
            .collect()
    }

    #[test]
    fn test_balanced_dataset_passes() {
        let report = DatasetValidator::new(ValidatorConfig::default()).validate(&balanced_dataset(5));
        assert!(report.passed(), "{:?}", report.warnings);
        assert_eq!(report.total, 10);
    }

    #[test]
    fn test_ninety_ten_grounding_fails_balance() {
        let report = DatasetValidator::new(ValidatorConfig::default()).validate(&balanced_dataset(9));

        let check = report.check("balance:is_grounded").unwrap();
        assert!(!check.passed);
        assert!(!report.passed());
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::Imbalance { dimension: Dimension::IsGrounded, value, .. } if value == "true"
        )));
    }

    #[test]
    fn test_vocabulary_weights_drive_expectations() {
        let mut vocab = Vocabularies::default();
        vocab.difficulties = Vocabulary::weighted(
            vec!["easy".into(), "hard".into(), "expert".into()],
            vec![1.0, 1.0, 2.0],
        )
        .unwrap();

        let report = DatasetValidator::new(ValidatorConfig::default())
            .with_vocabularies(vocab)
            .validate(&balanced_dataset(5));

        let check = report.check("balance:difficulty").unwrap();
        assert!(!check.passed);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::Imbalance { value, observed, .. } if value == "expert" && *observed == 0.0
        )));
    }

    #[test]
    fn test_length_outliers_are_flagged() {
        let mut records = balanced_dataset(5).into_records();
        records[0].question = "Too short?".to_string();
        records[1].question = "   ".to_string();
        records[2].expected_answer = String::new();
        let dataset = Dataset::new(records);

        let report = DatasetValidator::new(ValidatorConfig::default()).validate(&dataset);
        assert_eq!(report.check("question_length").unwrap().offending, vec!["r0", "r1"]);
        assert_eq!(report.check("answer_length").unwrap().offending, vec!["r2"]);
    }

    #[test]
    fn test_near_duplicates_keep_first() {
        let mut records = balanced_dataset(5).into_records();
        records[7].question = records[2].question.to_uppercase();
        let dataset = Dataset::new(records);

        let report = DatasetValidator::new(ValidatorConfig::default()).validate(&dataset);
        let check = report.check("duplicates").unwrap();
        assert_eq!(check.offending, vec!["r7"]);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            ValidationWarning::Duplicate { duplicate_of, .. } if duplicate_of == "r2"
        )));
    }

    #[test]
    fn test_embedding_duplicates() {
        let dataset = balanced_dataset(5);
        let mut embeddings = HashMap::new();
        for (i, record) in dataset.iter().enumerate() {
            let mut one_hot = vec![0.0; 10];
            one_hot[i] = 1.0;
            embeddings.insert(record.id.clone(), one_hot);
        }
        embeddings.insert("r9".to_string(), embeddings["r0"].clone());

        let report = DatasetValidator::new(ValidatorConfig::default())
            .validate_with_embeddings(&dataset, &embeddings);
        assert_eq!(report.check("duplicates").unwrap().offending, vec!["r9"]);
    }

    /// One-hot embedding per question; questions mentioning "sick" fail
    struct OneHotEmbedder {
        questions: Vec<&'static str>,
    }

    #[async_trait]
    impl Embedder for OneHotEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains("sick") {
                return Err(Error::Network("connection reset".to_string()));
            }
            let mut one_hot = vec![0.0; self.questions.len()];
            if let Some(i) = self.questions.iter().position(|q| *q == text) {
                one_hot[i] = 1.0;
            }
            Ok(one_hot)
        }
    }

    #[tokio::test]
    async fn test_failed_embedding_is_reported_unchecked() {
        let dataset = balanced_dataset(5);
        let embedder = Arc::new(OneHotEmbedder { questions: questions() });

        let report = DatasetValidator::new(ValidatorConfig::default())
            .validate_embedded(&dataset, embedder, 3, &CancelToken::new())
            .await;

        let check = report.check("duplicates").unwrap();
        assert!(!check.passed);
        assert_eq!(check.offending, vec!["r6"]);
        assert!(report.warnings.contains(&ValidationWarning::Unchecked {
            record_id: "r6".to_string(),
            reason: "Network error: connection reset".to_string(),
        }));

        // unchecked records are not rejected
        let (accepted, rejected) = filter_flagged(&dataset, &report);
        assert_eq!(accepted.len(), 10);
        assert!(rejected.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_embedding_leaves_every_record_unchecked() {
        let dataset = balanced_dataset(5);
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = DatasetValidator::new(ValidatorConfig::default())
            .validate_embedded(&dataset, Arc::new(OneHotEmbedder { questions: questions() }), 2, &cancel)
            .await;

        let unchecked: Vec<_> = report
            .warnings
            .iter()
            .filter(|w| matches!(w, ValidationWarning::Unchecked { reason, .. } if reason == "Run cancelled"))
            .collect();
        assert_eq!(unchecked.len(), 10);
    }

    #[test]
    fn test_missing_embedding_is_unchecked() {
        let dataset = balanced_dataset(5);
        let report = DatasetValidator::new(ValidatorConfig::default())
            .validate_with_embeddings(&dataset, &HashMap::new());
        assert_eq!(report.check("duplicates").unwrap().offending.len(), 10);
        assert_eq!(
            report.warnings.last().map(ValidationWarning::describe),
            Some("Not checked for duplicates: no question embedding".to_string())
        );
    }

    #[test]
    fn test_filter_does_not_touch_input() {
        let mut records = balanced_dataset(5).into_records();
        records[3].question = "Short".to_string();
        let dataset = Dataset::new(records);
        let before = dataset.clone();

        let report = DatasetValidator::new(ValidatorConfig::default()).validate(&dataset);
        let (accepted, rejected) = filter_flagged(&dataset, &report);

        assert_eq!(dataset, before);
        assert_eq!(accepted.len(), 9);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].record.id, "r3");
        assert!(rejected[0].filtered_reason.starts_with("Question length 1 words"));
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard_similarity("a b c", "A, b; C!"), 1.0);
        assert!((jaccard_similarity("a b", "b c") - 1.0 / 3.0).abs() < 1e-9);
    }
}
