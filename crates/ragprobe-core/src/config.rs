//! Run configuration and control-parameter vocabularies
//!
//! Configuration is loaded once at start-up and passed explicitly to the
//! components that need it; nothing here is global or mutable.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::{Dimension, Error, Result};

/// Settings for synthesis and evaluation runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// Neighbors per anchor chunk
    pub neighbors_k: usize,
    /// Depth at which retrieval is evaluated
    pub retrieval_k: usize,
    /// Maximum concurrent external calls
    pub concurrency: usize,
    /// Seed for control-parameter draws; entropy when absent
    pub seed: Option<u64>,
    /// Probability that a drawn record is grounded
    pub grounded_ratio: f64,
    /// Minimum score for a not-grounded answer to count as a good abstention
    pub good_abstention_threshold: u8,
    /// Scores strictly below this count as hallucination / unsupported
    pub hallucination_threshold: u8,
    /// Run the unanswerability check on not-grounded records
    pub verify_ungrounded: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            neighbors_k: 5,
            retrieval_k: 5,
            concurrency: 10,
            seed: None,
            grounded_ratio: 0.5,
            good_abstention_threshold: 4,
            hallucination_threshold: 3,
            verify_ungrounded: false,
        }
    }
}

impl EvalConfig {
    /// Defaults overridden by `RAGPROBE_*` environment variables (and `.env`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `RAGPROBE_*` keys
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "RAGPROBE_NEIGHBORS_K")? {
            config.neighbors_k = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_RETRIEVAL_K")? {
            config.retrieval_k = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_CONCURRENCY")? {
            config.concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_SEED")? {
            config.seed = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_GROUNDED_RATIO")? {
            config.grounded_ratio = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_GOOD_ABSTENTION_THRESHOLD")? {
            config.good_abstention_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_HALLUCINATION_THRESHOLD")? {
            config.hallucination_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_VERIFY_UNGROUNDED")? {
            config.verify_ungrounded = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.grounded_ratio) {
            return Err(Error::Configuration(format!(
                "grounded_ratio must be within [0, 1], got {}",
                self.grounded_ratio
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::Configuration("concurrency must be at least 1".to_string()));
        }
        if self.retrieval_k == 0 {
            return Err(Error::Configuration("retrieval_k must be at least 1".to_string()));
        }
        for (name, value) in [
            ("good_abstention_threshold", self.good_abstention_threshold),
            ("hallucination_threshold", self.hallucination_threshold),
        ] {
            if !(1..=5).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{} must be within 1..=5, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Bounds and tolerances for dataset validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub min_question_words: usize,
    pub max_question_words: usize,
    pub min_answer_words: usize,
    pub max_answer_words: usize,
    /// Allowed absolute difference between observed and expected frequency
    pub balance_tolerance: f64,
    /// Question similarity at or above which two records are duplicates
    pub duplicate_threshold: f64,
    pub expected_grounded_ratio: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            min_question_words: 5,
            max_question_words: 50,
            min_answer_words: 1,
            max_answer_words: 400,
            balance_tolerance: 0.1,
            duplicate_threshold: 0.95,
            expected_grounded_ratio: 0.5,
        }
    }
}

impl ValidatorConfig {
    /// Defaults overridden by `RAGPROBE_*` environment variables (and `.env`).
    /// The expected grounded ratio shares `RAGPROBE_GROUNDED_RATIO` with the
    /// synthesis settings.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "RAGPROBE_MIN_QUESTION_WORDS")? {
            config.min_question_words = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_MAX_QUESTION_WORDS")? {
            config.max_question_words = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_MIN_ANSWER_WORDS")? {
            config.min_answer_words = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_MAX_ANSWER_WORDS")? {
            config.max_answer_words = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_BALANCE_TOLERANCE")? {
            config.balance_tolerance = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_DUPLICATE_THRESHOLD")? {
            config.duplicate_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RAGPROBE_GROUNDED_RATIO")? {
            config.expected_grounded_ratio = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, min, max) in [
            ("question", self.min_question_words, self.max_question_words),
            ("answer", self.min_answer_words, self.max_answer_words),
        ] {
            if min > max {
                return Err(Error::Configuration(format!(
                    "min {} words ({}) exceeds max ({})",
                    field, min, max
                )));
            }
        }
        for (name, value) in [
            ("balance_tolerance", self.balance_tolerance),
            ("duplicate_threshold", self.duplicate_threshold),
            ("expected_grounded_ratio", self.expected_grounded_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// A finite set of options for one control dimension, optionally weighted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    options: Vec<String>,
    /// `None` means uniform
    weights: Option<Vec<f64>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VocabularyLine {
    Weighted { option: String, weight: Option<f64> },
    Bare(String),
}

impl Vocabulary {
    /// Uniform vocabulary over the given options
    pub fn uniform<S: Into<String>>(options: impl IntoIterator<Item = S>) -> Result<Self> {
        Self::build(options.into_iter().map(Into::into).collect(), None)
    }

    /// Weighted vocabulary; `options` and `weights` must have equal length
    pub fn weighted(options: Vec<String>, weights: Vec<f64>) -> Result<Self> {
        if options.len() != weights.len() {
            return Err(Error::Configuration(format!(
                "{} options but {} weights",
                options.len(),
                weights.len()
            )));
        }
        Self::build(options, Some(weights))
    }

    fn build(options: Vec<String>, weights: Option<Vec<f64>>) -> Result<Self> {
        if options.is_empty() {
            return Err(Error::Configuration("vocabulary has no options".to_string()));
        }
        if let Some(ref w) = weights {
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(Error::Configuration("weights must be finite and non-negative".to_string()));
            }
            if w.iter().sum::<f64>() <= 0.0 {
                return Err(Error::Configuration("weights sum to zero".to_string()));
            }
        }
        // Equal weights carry no information
        let weights = weights.filter(|w| w.windows(2).any(|pair| pair[0] != pair[1]));
        Ok(Self { options, weights })
    }

    /// Parse JSONL: each non-blank line is a JSON string or
    /// `{"option": ..., "weight": ...}` (weight defaults to 1)
    pub fn from_jsonl(content: &str) -> Result<Self> {
        let mut options = Vec::new();
        let mut weights = Vec::new();

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: VocabularyLine = serde_json::from_str(line).map_err(|e| {
                Error::Configuration(format!("line {}: {}", line_no + 1, e))
            })?;
            match entry {
                VocabularyLine::Weighted { option, weight } => {
                    options.push(option);
                    weights.push(weight.unwrap_or(1.0));
                }
                VocabularyLine::Bare(option) => {
                    options.push(option);
                    weights.push(1.0);
                }
            }
        }

        Self::weighted(options, weights)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_jsonl(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn weights(&self) -> Option<&[f64]> {
        self.weights.as_deref()
    }

    pub fn contains(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }

    /// Expected share of each option under this vocabulary's distribution
    pub fn expected_frequencies(&self) -> Vec<(String, f64)> {
        match &self.weights {
            Some(weights) => {
                let total: f64 = weights.iter().sum();
                self.options
                    .iter()
                    .cloned()
                    .zip(weights.iter().map(|w| w / total))
                    .collect()
            }
            None => {
                let share = 1.0 / self.options.len() as f64;
                self.options.iter().map(|o| (o.clone(), share)).collect()
            }
        }
    }
}

/// Vocabularies for every categorical control dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabularies {
    pub domains: Vocabulary,
    pub difficulties: Vocabulary,
    pub tones: Vocabulary,
    pub languages: Vocabulary,
    pub topics: Vocabulary,
}

impl Default for Vocabularies {
    fn default() -> Self {
        let uniform = |options: &[&str]| Vocabulary {
            options: options.iter().map(|s| s.to_string()).collect(),
            weights: None,
        };
        Self {
            domains: uniform(&["general"]),
            difficulties: uniform(&["easy", "medium", "hard"]),
            tones: uniform(&["formal", "casual", "neutral"]),
            languages: uniform(&["English"]),
            topics: uniform(&["general"]),
        }
    }
}

impl Vocabularies {
    /// Load `domains.jsonl`, `difficulties.jsonl`, `tones.jsonl`,
    /// `languages.jsonl` and `topics.jsonl` from a settings directory.
    /// Missing files fall back to the built-in defaults.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Configuration(format!(
                "settings directory '{}' does not exist",
                dir.display()
            )));
        }

        let defaults = Self::default();
        let load = |file: &str, fallback: Vocabulary| -> Result<Vocabulary> {
            let path = dir.join(file);
            if path.exists() {
                let vocab = Vocabulary::load(&path)?;
                debug!(file, options = vocab.options().len(), "loaded vocabulary");
                Ok(vocab)
            } else {
                info!(file, "vocabulary file missing, using defaults");
                Ok(fallback)
            }
        };

        Ok(Self {
            domains: load("domains.jsonl", defaults.domains)?,
            difficulties: load("difficulties.jsonl", defaults.difficulties)?,
            tones: load("tones.jsonl", defaults.tones)?,
            languages: load("languages.jsonl", defaults.languages)?,
            topics: load("topics.jsonl", defaults.topics)?,
        })
    }

    /// Vocabulary for a categorical dimension; `None` for `IsGrounded`
    pub fn for_dimension(&self, dimension: Dimension) -> Option<&Vocabulary> {
        match dimension {
            Dimension::Difficulty => Some(&self.difficulties),
            Dimension::Tone => Some(&self.tones),
            Dimension::Language => Some(&self.languages),
            Dimension::Domain => Some(&self.domains),
            Dimension::Topic => Some(&self.topics),
            Dimension::IsGrounded => None,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Configuration(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
