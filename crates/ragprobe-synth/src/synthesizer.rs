//! Controlled question/answer synthesis over a corpus

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use ragprobe_core::{
    CancelToken, ChunkId, ControlParams, Corpus, Dataset, Error, EvalConfig, GenerationRequest,
    Generator, NeighborSelector, NeighborSet, Result, SyntheticRecord, Vocabularies, fan_out,
};

use crate::params::ParameterSampler;
use crate::prompt::{PromptBuilder, parse_generated_pair};
use crate::verify::UnanswerabilityCheck;

const MAX_COMPLETION_TOKENS: u32 = 5000;

/// Any failure of a service call during synthesis surfaces as `Generation`
fn as_generation_error(e: Error) -> Error {
    match e {
        Error::Generation(_) => e,
        other => Error::Generation(other.to_string()),
    }
}

/// Everything needed to synthesize one record, owned so it can move into a task
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub anchor_id: ChunkId,
    pub anchor_text: String,
    /// Neighbor ids and texts in rank order
    pub neighbors: Vec<(ChunkId, String)>,
    pub params: ControlParams,
}

impl SynthesisRequest {
    pub fn from_neighbor_set(corpus: &Corpus, set: &NeighborSet, params: ControlParams) -> Result<Self> {
        let anchor = corpus.get(&set.anchor_id)?;
        let neighbors = set
            .neighbors
            .iter()
            .map(|n| corpus.get(&n.chunk_id).map(|c| (c.id.clone(), c.text.clone())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            anchor_id: anchor.id.clone(),
            anchor_text: anchor.text.clone(),
            neighbors,
            params,
        })
    }

    /// Anchor followed by neighbors
    pub fn source_chunk_ids(&self) -> Vec<ChunkId> {
        std::iter::once(self.anchor_id.clone())
            .chain(self.neighbors.iter().map(|(id, _)| id.clone()))
            .collect()
    }

    pub fn context(&self) -> Vec<String> {
        std::iter::once(self.anchor_text.clone())
            .chain(self.neighbors.iter().map(|(_, text)| text.clone()))
            .collect()
    }
}

/// A record that could not be synthesized, with its cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisFailure {
    pub anchor_chunk_id: ChunkId,
    #[serde(flatten)]
    pub params: ControlParams,
    pub error: String,
}

/// Result of synthesizing over many anchors
#[derive(Debug, Clone, Default)]
pub struct SynthesisOutcome {
    pub records: Dataset,
    pub failures: Vec<SynthesisFailure>,
    pub cancelled: bool,
    /// Requests dropped by cancellation before they completed. They are
    /// also listed in `failures`.
    pub discarded: usize,
}

/// Draw parameters and assemble requests for the first `limit` chunks.
///
/// Parameters are drawn sequentially in corpus order so a seed fixes the
/// whole parameter sequence. Fails when the corpus cannot supply
/// `config.neighbors_k` neighbors.
pub fn plan_requests(
    corpus: &Corpus,
    config: &EvalConfig,
    vocabularies: &Vocabularies,
    limit: Option<usize>,
) -> Result<Vec<SynthesisRequest>> {
    let selector = NeighborSelector::new(corpus, config.neighbors_k)?;
    let mut sampler = ParameterSampler::new(vocabularies, config.grounded_ratio, config.seed)?;

    corpus
        .chunks()
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|chunk| {
            let set = selector.select(&chunk.id)?;
            SynthesisRequest::from_neighbor_set(corpus, &set, sampler.draw())
        })
        .collect()
}

/// Requests one labeled question/answer pair per anchor from a generation service
#[derive(Clone)]
pub struct Synthesizer {
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptBuilder>,
    verifier: Option<UnanswerabilityCheck>,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            prompts: Arc::new(PromptBuilder::default()),
            verifier: None,
        }
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    /// Reject not-grounded records that turn out to be answerable
    pub fn with_verifier(mut self, verifier: UnanswerabilityCheck) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Synthesize one record. Not deterministic: depends on the generation service.
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SyntheticRecord> {
        let neighbor_texts: Vec<String> = request.neighbors.iter().map(|(_, t)| t.clone()).collect();
        let user = self
            .prompts
            .user_prompt(&request.anchor_text, &neighbor_texts, &request.params);
        let generation = GenerationRequest::new(self.prompts.system_message(request.params.is_grounded), user)
            .with_json_response()
            .with_max_tokens(MAX_COMPLETION_TOKENS);

        let reply = self.generator.generate(&generation).await.map_err(as_generation_error)?;
        let pair = parse_generated_pair(&reply)?;

        if !request.params.is_grounded {
            if let Some(ref verifier) = self.verifier {
                let verdict = verifier
                    .check(&pair.question, &request.context())
                    .await
                    .map_err(as_generation_error)?;
                if verdict.answerable {
                    return Err(Error::Generation(format!(
                        "not-grounded question is answerable from supplied chunks: {}",
                        verdict.reason
                    )));
                }
            }
        }

        let suffix = Uuid::new_v4().simple().to_string();
        Ok(SyntheticRecord {
            id: format!("{}_synthetic_{}", request.anchor_id, &suffix[..8]),
            question: pair.question,
            expected_answer: pair.answer,
            explanation: pair.explanation,
            anchor_chunk_id: request.anchor_id.clone(),
            source_chunk_ids: request.source_chunk_ids(),
            params: request.params.clone(),
        })
    }

    /// Synthesize every request with at most `concurrency` calls in flight.
    ///
    /// Per-record failures are collected, never fatal.
    pub async fn synthesize_all(
        &self,
        requests: Vec<SynthesisRequest>,
        concurrency: usize,
        cancel: &CancelToken,
    ) -> SynthesisOutcome {
        let total = requests.len();
        info!(total, concurrency, model = self.generator.model_id(), "synthesizing questions");
        let planned: Vec<(ChunkId, ControlParams)> = requests
            .iter()
            .map(|r| (r.anchor_id.clone(), r.params.clone()))
            .collect();

        let out = fan_out(requests, concurrency, cancel, |request| {
            let this = self.clone();
            async move {
                let result = this.synthesize(&request).await;
                (request, result)
            }
        })
        .await;

        let cancelled = out.cancelled;
        let discarded = out.discarded.len();
        let mut records = Vec::new();
        let mut failures: Vec<SynthesisFailure> = out
            .discarded
            .iter()
            .filter_map(|&i| planned.get(i))
            .map(|(anchor_id, params)| SynthesisFailure {
                anchor_chunk_id: anchor_id.clone(),
                params: params.clone(),
                error: Error::Cancelled.to_string(),
            })
            .collect();

        for (request, result) in out.into_results() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(chunk_id = %request.anchor_id, grounded = request.params.is_grounded, "synthesis failed: {}", e);
                    failures.push(SynthesisFailure {
                        anchor_chunk_id: request.anchor_id,
                        params: request.params,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            succeeded = records.len(),
            failed = failures.len(),
            discarded,
            cancelled,
            "synthesis finished"
        );

        SynthesisOutcome {
            records: Dataset::new(records),
            failures,
            cancelled,
            discarded,
        }
    }

    /// Plan and synthesize over a whole corpus
    pub async fn synthesize_corpus(
        &self,
        corpus: &Corpus,
        config: &EvalConfig,
        vocabularies: &Vocabularies,
        limit: Option<usize>,
        cancel: &CancelToken,
    ) -> Result<SynthesisOutcome> {
        let requests = plan_requests(corpus, config, vocabularies, limit)?;
        Ok(self.synthesize_all(requests, config.concurrency, cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragprobe_core::Chunk;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers according to the grounding label, failing every `fail_every`th call
    struct ScriptedGenerator {
        calls: AtomicUsize,
        fail_every: usize,
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_every > 0 && n % self.fail_every == 0 {
                return Err(Error::Network("connection reset".to_string()));
            }
            let grounded = request.user.ends_with("# Grounded: true\n");
            Ok(serde_json::json!({
                "question": ["What does the policy say about late returns?"],
                "response": [if grounded { "They are refused." } else { "That is not covered." }],
                "explanation": ["test"],
            })
            .to_string())
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn corpus(n: usize) -> Corpus {
        Corpus::new(
            (0..n)
                .map(|i| Chunk {
                    id: format!("c{}", i),
                    text: format!("text {}", i),
                    embedding: vec![1.0, i as f32],
                    source: "doc".to_string(),
                })
                .collect(),
        )
        .unwrap()
    }

    fn config(k: usize) -> EvalConfig {
        EvalConfig {
            neighbors_k: k,
            seed: Some(11),
            concurrency: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_plan_is_seeded_and_sized() {
        let corpus = corpus(8);
        let vocab = Vocabularies::default();
        let a = plan_requests(&corpus, &config(5), &vocab, None).unwrap();
        let b = plan_requests(&corpus, &config(5), &vocab, None).unwrap();

        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        for request in &a {
            assert_eq!(request.neighbors.len(), 5);
            assert_eq!(request.source_chunk_ids().len(), 6);
            assert!(request.neighbors.iter().all(|(id, _)| *id != request.anchor_id));
        }

        let limited = plan_requests(&corpus, &config(5), &vocab, Some(3)).unwrap();
        assert_eq!(limited.len(), 3);
    }

    #[test]
    fn test_plan_fails_for_small_corpus() {
        let result = plan_requests(&corpus(3), &config(5), &Vocabularies::default(), None);
        assert!(matches!(result, Err(Error::InsufficientData { .. })));
    }

    #[tokio::test]
    async fn test_synthesize_builds_record() {
        let corpus = corpus(4);
        let requests = plan_requests(&corpus, &config(2), &Vocabularies::default(), Some(1)).unwrap();
        let synthesizer = Synthesizer::new(Arc::new(ScriptedGenerator {
            calls: AtomicUsize::new(0),
            fail_every: 0,
        }));

        let record = synthesizer.synthesize(&requests[0]).await.unwrap();
        assert!(record.id.starts_with("c0_synthetic_"));
        assert_eq!(record.id.len(), "c0_synthetic_".len() + 8);
        assert_eq!(record.source_chunk_ids.len(), 3);
        assert_eq!(record.source_chunk_ids[0], "c0");
        assert_eq!(record.params, requests[0].params);
        let expected = if record.is_grounded() { "They are refused." } else { "That is not covered." };
        assert_eq!(record.expected_answer, expected);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let corpus = corpus(9);
        let synthesizer = Synthesizer::new(Arc::new(ScriptedGenerator {
            calls: AtomicUsize::new(0),
            fail_every: 3,
        }));

        let outcome = synthesizer
            .synthesize_corpus(&corpus, &config(2), &Vocabularies::default(), None, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.records.len() + outcome.failures.len(), 9);
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome.failures.iter().all(|f| f.error.contains("connection reset")));
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_requests_are_named_failures() {
        let corpus = corpus(5);
        let requests = plan_requests(&corpus, &config(2), &Vocabularies::default(), None).unwrap();
        let synthesizer = Synthesizer::new(Arc::new(ScriptedGenerator {
            calls: AtomicUsize::new(0),
            fail_every: 0,
        }));
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = synthesizer.synthesize_all(requests, 2, &cancel).await;
        assert!(outcome.cancelled);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.discarded, 5);
        let anchors: Vec<_> = outcome.failures.iter().map(|f| f.anchor_chunk_id.as_str()).collect();
        assert_eq!(anchors, vec!["c0", "c1", "c2", "c3", "c4"]);
        assert!(outcome.failures.iter().all(|f| f.error == "Run cancelled"));
    }

    #[tokio::test]
    async fn test_verifier_outage_is_a_generation_error() {
        struct Offline;

        #[async_trait]
        impl Generator for Offline {
            async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
                Err(Error::Timeout("verifier timed out".to_string()))
            }

            fn model_id(&self) -> &str {
                "offline"
            }
        }

        let corpus = corpus(4);
        let mut requests = plan_requests(&corpus, &config(2), &Vocabularies::default(), Some(1)).unwrap();
        requests[0].params.is_grounded = false;
        let synthesizer = Synthesizer::new(Arc::new(ScriptedGenerator {
            calls: AtomicUsize::new(0),
            fail_every: 0,
        }))
        .with_verifier(UnanswerabilityCheck::new(Arc::new(Offline)));

        let err = synthesizer.synthesize(&requests[0]).await.unwrap_err();
        assert_eq!(err.to_string(), "Generation error: Timeout error: verifier timed out");
    }

    #[tokio::test]
    async fn test_verifier_rejects_answerable_questions() {
        struct AlwaysAnswerable;

        #[async_trait]
        impl Generator for AlwaysAnswerable {
            async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
                Ok(r#"{"answerable": true, "reason": "chunk 1 states it"}"#.to_string())
            }

            fn model_id(&self) -> &str {
                "verifier"
            }
        }

        let request = SynthesisRequest {
            anchor_id: "c0".to_string(),
            anchor_text: "Returns are accepted within 30 days.".to_string(),
            neighbors: vec![("c1".to_string(), "Refunds go to the card.".to_string())],
            params: ControlParams {
                difficulty: "easy".to_string(),
                tone: "formal".to_string(),
                language: "English".to_string(),
                domain: "retail".to_string(),
                topic: "returns".to_string(),
                question_length: 8,
                is_grounded: false,
            },
        };
        let synthesizer = Synthesizer::new(Arc::new(ScriptedGenerator {
            calls: AtomicUsize::new(0),
            fail_every: 0,
        }))
        .with_verifier(UnanswerabilityCheck::new(Arc::new(AlwaysAnswerable)));

        let err = synthesizer.synthesize(&request).await.unwrap_err();
        assert!(matches!(err, Error::Generation(ref m) if m.contains("answerable")));
    }
}
