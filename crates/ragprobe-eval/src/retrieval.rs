//! Retrieval metrics: Hit Rate@k and Mean Reciprocal Rank
//!
//! Every grounded record's question is sent to the search service; the
//! returned ranking is kept verbatim (no re-ranking) and truncated to `k`.
//! A record counts as a hit when any of its source chunks shows up in the
//! truncated ranking, and its reciprocal rank is `1/r` for the first such
//! chunk at 1-based rank `r`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use ragprobe_core::{
    CancelToken, ChunkId, Dataset, Error, Result, RetrievalResult, SearchService, SyntheticRecord,
    fan_out,
};

use crate::report::{Unevaluable, cancelled_records, mean, sort_unevaluable};

/// Per-record retrieval outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRetrieval {
    pub record_id: String,
    /// Ranked chunk ids, truncated to `k`
    pub retrieved: Vec<ChunkId>,
    pub hit: bool,
    pub reciprocal_rank: f64,
    /// 1-based rank of the first source chunk found
    pub first_hit_rank: Option<usize>,
}

/// Aggregate retrieval metrics over the evaluated grounded records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalReport {
    pub k: usize,
    pub evaluated: usize,
    pub hit_rate: f64,
    pub mrr: f64,
    pub records: Vec<RecordRetrieval>,
    pub unevaluable: Vec<Unevaluable>,
    /// Not-grounded records, which have no retrieval ground truth
    pub skipped_ungrounded: usize,
    pub cancelled: bool,
    /// Records dropped by cancellation before their search completed. They
    /// are also listed in `unevaluable`.
    pub discarded: usize,
}

impl RetrievalReport {
    /// Aggregate from per-record outcomes.
    ///
    /// Records are sorted by id before summing, so the result does not
    /// depend on completion order.
    pub fn from_records(k: usize, mut records: Vec<RecordRetrieval>, mut unevaluable: Vec<Unevaluable>) -> Self {
        records.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        sort_unevaluable(&mut unevaluable);

        let hits = records.iter().filter(|r| r.hit).count();
        let rr_sum: f64 = records.iter().map(|r| r.reciprocal_rank).sum();

        Self {
            k,
            evaluated: records.len(),
            hit_rate: mean(hits as f64, records.len()),
            mrr: mean(rr_sum, records.len()),
            records,
            unevaluable,
            skipped_ungrounded: 0,
            cancelled: false,
            discarded: 0,
        }
    }
}

/// Score one ranking against a record's source chunks at depth `k`
pub fn score_ranking(result: &RetrievalResult, sources: &[ChunkId], k: usize) -> RecordRetrieval {
    let sources: HashSet<&str> = sources.iter().map(String::as_str).collect();
    let retrieved: Vec<ChunkId> = result.chunk_ids.iter().take(k).cloned().collect();
    let first_hit_rank = retrieved
        .iter()
        .position(|id| sources.contains(id.as_str()))
        .map(|index| index + 1);

    RecordRetrieval {
        record_id: result.record_id.clone(),
        retrieved,
        hit: first_hit_rank.is_some(),
        reciprocal_rank: first_hit_rank.map(|rank| 1.0 / rank as f64).unwrap_or(0.0),
        first_hit_rank,
    }
}

/// Queries a search service with every grounded question
#[derive(Clone)]
pub struct RetrievalEvaluator {
    search: Arc<dyn SearchService>,
    k: usize,
    concurrency: usize,
}

impl RetrievalEvaluator {
    pub fn new(search: Arc<dyn SearchService>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::InvalidInput("retrieval k must be at least 1".to_string()));
        }
        Ok(Self {
            search,
            k,
            concurrency: 10,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Search with one record's question and score the ranking
    pub async fn evaluate_record(&self, record: &SyntheticRecord) -> Result<RecordRetrieval> {
        if record.source_chunk_ids.is_empty() {
            return Err(Error::InvalidInput("record has no source chunks".to_string()));
        }

        let hits = self.search.search(&record.question, self.k).await.map_err(|e| match e {
            Error::Search(_) => e,
            other => Error::Search(other.to_string()),
        })?;

        let result = RetrievalResult {
            record_id: record.id.clone(),
            chunk_ids: hits.into_iter().map(|h| h.chunk_id).collect(),
        };
        Ok(score_ranking(&result, &record.source_chunk_ids, self.k))
    }

    /// Evaluate every grounded record of a dataset.
    ///
    /// Search failures are recorded as unevaluable and kept out of both
    /// denominators.
    pub async fn evaluate(&self, dataset: &Dataset, cancel: &CancelToken) -> RetrievalReport {
        let (grounded, not_grounded) = dataset.partition();
        let grounded: Vec<SyntheticRecord> = grounded.into_iter().cloned().collect();
        info!(
            grounded = grounded.len(),
            skipped = not_grounded.len(),
            k = self.k,
            "evaluating retrieval"
        );

        let record_ids: Vec<String> = grounded.iter().map(|r| r.id.clone()).collect();
        let out = fan_out(grounded, self.concurrency, cancel, |record| {
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
        let mut records = Vec::new();
        for (record_id, result) in out.into_results() {
            match result {
                Ok(scored) => records.push(scored),
                Err(e) => {
                    warn!(record_id = %record_id, "retrieval unevaluable: {}", e);
                    unevaluable.push(Unevaluable::new(record_id, e.to_string()));
                }
            }
        }

        let mut report = RetrievalReport::from_records(self.k, records, unevaluable);
        report.skipped_ungrounded = not_grounded.len();
        report.cancelled = cancelled;
        report.discarded = discarded;

        info!(
            evaluated = report.evaluated,
            unevaluable = report.unevaluable.len(),
            hit_rate = report.hit_rate,
            mrr = report.mrr,
            "retrieval evaluation finished"
        );
        report
    }
}
