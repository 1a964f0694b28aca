//! Groundedness judges
//!
//! `RuleJudge` scores offline from abstention phrases and word overlap.
//! `ModelJudge` asks a generation service for a structured verdict.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use ragprobe_core::{
    Error, GenerationRequest, Generator, GroundednessVerdict, Judge, JudgeRequest, Result, Verdict,
    strip_code_fence,
};

const ABSTENTION_PATTERN: &str = r"(?i)\b(?:i\s+(?:do\s+not|don't|don’t|cannot|can't)\s+(?:have|know|find|answer)|(?:information|details?|data|answer)\s+(?:is|are)\s+not\s+(?:available|provided|given|included|present)|not\s+(?:mentioned|provided|available|included|specified|stated|found|covered)\s+in\s+the\s+(?:context|provided|supplied|given|documents?|text|material)|(?:cannot|can't|can\s+not)\s+be\s+(?:determined|answered|found)|(?:unable|not\s+able)\s+to\s+(?:find|answer|determine)|no\s+(?:relevant\s+)?information|insufficient\s+information|(?:does\s+not|doesn't)\s+(?:contain|mention|say|specify|include))";

const HEDGE_PATTERN: &str =
    r"(?i)\b(?:might|may|possibly|probably|likely|perhaps|approximately|roughly|unclear|not\s+sure|it\s+depends)\b";

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "with", "that", "this", "from", "have", "has", "had",
    "its", "into", "than", "then", "they", "their", "them", "there", "which", "who", "whom", "what",
    "when", "where", "why", "how", "but", "not", "can", "will", "would", "should", "could", "been",
    "being", "also", "only", "any", "all", "each", "per", "our", "your", "you", "she", "his", "her",
];

fn content_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3 || w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

fn coverage_score(coverage: f64) -> u8 {
    match coverage {
        c if c >= 0.8 => 5,
        c if c >= 0.6 => 4,
        c if c >= 0.4 => 3,
        c if c >= 0.2 => 2,
        _ => 1,
    }
}

/// Offline judge built on phrase matching and word overlap
pub struct RuleJudge {
    abstention: Regex,
    hedge: Regex,
}

impl RuleJudge {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Configuration(format!("invalid judge pattern: {}", e)))
        };
        Ok(Self {
            abstention: compile(ABSTENTION_PATTERN)?,
            hedge: compile(HEDGE_PATTERN)?,
        })
    }

    /// True when the answer declines or says the information is missing
    pub fn is_abstention(&self, answer: &str) -> bool {
        self.abstention.is_match(answer)
    }

    fn judge(&self, request: &JudgeRequest<'_>) -> GroundednessVerdict {
        let answer = request.answer.trim();
        let verdict = |verdict, abstained, reasoning: String| GroundednessVerdict {
            verdict,
            abstained,
            answer: answer.to_string(),
            reasoning: Some(reasoning),
        };

        if answer.is_empty() {
            return verdict(Verdict::Fail, false, "empty answer".to_string());
        }

        let abstained = self.is_abstention(answer);

        if !request.is_grounded {
            return if abstained {
                verdict(Verdict::Score(5), true, "declined to answer".to_string())
            } else if self.hedge.is_match(answer) {
                verdict(Verdict::Score(2), false, "hedged answer to an unanswerable question".to_string())
            } else {
                verdict(Verdict::Score(1), false, "answered an unanswerable question".to_string())
            };
        }

        if abstained {
            return verdict(Verdict::Score(1), true, "declined although the context holds the answer".to_string());
        }

        let answer_words = content_words(answer);
        let expected = content_words(request.expected_answer);
        let (covered, total, basis) = if expected.is_empty() {
            // Nothing to compare against; fall back to support by the context
            let context: HashSet<String> = request.context.iter().flat_map(|c| content_words(c)).collect();
            let supported = answer_words.iter().filter(|w| context.contains(*w)).count();
            (supported, answer_words.len(), "answer words found in context")
        } else {
            let covered = expected.iter().filter(|w| answer_words.contains(*w)).count();
            (covered, expected.len(), "expected answer words found in answer")
        };

        let coverage = if total == 0 { 0.0 } else { covered as f64 / total as f64 };
        verdict(
            Verdict::score(coverage_score(coverage)),
            false,
            format!("{} of {} {}", covered, total, basis),
        )
    }
}

#[async_trait]
impl Judge for RuleJudge {
    async fn score(&self, request: &JudgeRequest<'_>) -> Result<GroundednessVerdict> {
        Ok(self.judge(request))
    }
}

const JUDGE_SYSTEM_MESSAGE: &str = "\
You grade answers produced by a document question-answering assistant.
The assistant only saw the CONTEXT. Score how well the ANSWER is grounded in it on a 1-5 scale.
If GROUNDED is true the context holds the answer: 5 means correct and fully supported, 1 means wrong, unsupported or a refusal.
If GROUNDED is false the context does not hold the answer: 5 means the assistant clearly said the information is not available, 1 means it made up an answer.
Set \"abstained\" to true when the assistant declined to answer.
Reply with a JSON object: {\"score\": 1-5, \"abstained\": true|false, \"reasoning\": \"...\"}";

#[derive(Deserialize)]
struct ModelVerdict {
    score: u8,
    #[serde(default)]
    abstained: bool,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Judge backed by a generation service
#[derive(Clone)]
pub struct ModelJudge {
    generator: Arc<dyn Generator>,
}

impl ModelJudge {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    fn prompt(request: &JudgeRequest<'_>) -> String {
        let context = request
            .context
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "# CONTEXT:\n{}\n\n# QUESTION:\n{}\n\n# EXPECTED ANSWER:\n{}\n\n# GROUNDED: {}\n\n# ANSWER:\n{}\n",
            context, request.question, request.expected_answer, request.is_grounded, request.answer
        )
    }
}

#[async_trait]
impl Judge for ModelJudge {
    async fn score(&self, request: &JudgeRequest<'_>) -> Result<GroundednessVerdict> {
        let generation = GenerationRequest::new(JUDGE_SYSTEM_MESSAGE, Self::prompt(request))
            .with_json_response()
            .with_temperature(0.0);
        let reply = self
            .generator
            .generate(&generation)
            .await
            .map_err(|e| Error::Judge(e.to_string()))?;

        let verdict = match serde_json::from_str::<ModelVerdict>(strip_code_fence(&reply)) {
            Ok(parsed) => GroundednessVerdict {
                verdict: Verdict::score(parsed.score),
                abstained: parsed.abstained,
                answer: request.answer.to_string(),
                reasoning: parsed.reasoning,
            },
            Err(e) => {
                debug!(model = self.generator.model_id(), "unparseable judge reply: {}", e);
                GroundednessVerdict {
                    verdict: Verdict::Undetermined,
                    abstained: false,
                    answer: request.answer.to_string(),
                    reasoning: Some(format!("unparseable judge reply: {}", e)),
                }
            }
        };
        Ok(verdict)
    }
}
