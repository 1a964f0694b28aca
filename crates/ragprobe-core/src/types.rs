//! Data model shared by the synthesizer, the validator and both metrics engines

use serde::{Deserialize, Serialize};

/// Identifier of a chunk in the knowledge base
pub type ChunkId = String;

/// An immutable unit of source content with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Reference to the source document (title, path or URL)
    #[serde(default)]
    pub source: String,
}

/// One entry of a neighbor set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub chunk_id: ChunkId,
    pub score: f32,
}

/// The k most similar chunks to an anchor chunk.
///
/// Neighbors are ordered by descending similarity, ties broken by ascending
/// chunk id. The anchor never appears in its own set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborSet {
    pub anchor_id: ChunkId,
    pub neighbors: Vec<Neighbor>,
}

impl NeighborSet {
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Neighbor chunk ids in rank order
    pub fn chunk_ids(&self) -> impl Iterator<Item = &str> {
        self.neighbors.iter().map(|n| n.chunk_id.as_str())
    }
}

/// A control dimension along which synthetic records are distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Difficulty,
    Tone,
    Language,
    Domain,
    Topic,
    IsGrounded,
}

impl Dimension {
    /// All dimensions checked for balance
    pub fn all() -> [Dimension; 6] {
        [
            Dimension::Difficulty,
            Dimension::Tone,
            Dimension::Language,
            Dimension::Domain,
            Dimension::Topic,
            Dimension::IsGrounded,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Difficulty => "difficulty",
            Dimension::Tone => "tone",
            Dimension::Language => "language",
            Dimension::Domain => "domain",
            Dimension::Topic => "topic",
            Dimension::IsGrounded => "is_grounded",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The parameter draw that steers one synthetic question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlParams {
    pub difficulty: String,
    pub tone: String,
    pub language: String,
    pub domain: String,
    pub topic: String,
    /// Target question length in words
    pub question_length: usize,
    pub is_grounded: bool,
}

impl ControlParams {
    /// Value of this draw along a dimension, as used for balance checks
    pub fn value(&self, dimension: Dimension) -> String {
        match dimension {
            Dimension::Difficulty => self.difficulty.clone(),
            Dimension::Tone => self.tone.clone(),
            Dimension::Language => self.language.clone(),
            Dimension::Domain => self.domain.clone(),
            Dimension::Topic => self.topic.clone(),
            Dimension::IsGrounded => self.is_grounded.to_string(),
        }
    }
}

/// A labeled synthetic test case.
///
/// When `is_grounded` is true the expected answer is derivable from
/// `source_chunk_ids` alone; when false it is derivable from none of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    pub id: String,
    pub question: String,
    pub expected_answer: String,
    /// Why the pair is (or is not) grounded in the chunk set
    #[serde(default)]
    pub explanation: String,
    pub anchor_chunk_id: ChunkId,
    /// Anchor followed by its neighbors
    pub source_chunk_ids: Vec<ChunkId>,
    #[serde(flatten)]
    pub params: ControlParams,
}

impl SyntheticRecord {
    pub fn is_grounded(&self) -> bool {
        self.params.is_grounded
    }
}

/// An ordered collection of synthetic records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dataset {
    records: Vec<SyntheticRecord>,
}

impl Dataset {
    pub fn new(records: Vec<SyntheticRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SyntheticRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SyntheticRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SyntheticRecord> {
        self.records.iter()
    }

    pub fn grounded(&self) -> impl Iterator<Item = &SyntheticRecord> {
        self.records.iter().filter(|r| r.is_grounded())
    }

    /// Split into (grounded, not grounded), preserving order
    pub fn partition(&self) -> (Vec<&SyntheticRecord>, Vec<&SyntheticRecord>) {
        self.records.iter().partition(|r| r.is_grounded())
    }
}

impl FromIterator<SyntheticRecord> for Dataset {
    fn from_iter<I: IntoIterator<Item = SyntheticRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a SyntheticRecord;
    type IntoIter = std::slice::Iter<'a, SyntheticRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Ranked chunk ids returned by the search service for one grounded record,
/// truncated to the evaluated depth
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub record_id: String,
    pub chunk_ids: Vec<ChunkId>,
}

/// Outcome of judging one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value", try_from = "VerdictRepr")]
pub enum Verdict {
    /// Groundedness on a 1..=5 scale
    Score(u8),
    Fail,
    Undetermined,
}

/// Wire form of `Verdict`, checked on the way in
#[derive(Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
enum VerdictRepr {
    Score(u8),
    Fail,
    Undetermined,
}

impl TryFrom<VerdictRepr> for Verdict {
    type Error = String;

    fn try_from(repr: VerdictRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            VerdictRepr::Score(value) if Verdict::SCALE.contains(&value) => Ok(Verdict::Score(value)),
            VerdictRepr::Score(value) => Err(format!("score {} outside the 1-5 scale", value)),
            VerdictRepr::Fail => Ok(Verdict::Fail),
            VerdictRepr::Undetermined => Ok(Verdict::Undetermined),
        }
    }
}

impl Verdict {
    pub const SCALE: std::ops::RangeInclusive<u8> = 1..=5;

    /// Build a score verdict, clamping out-of-range values to `Undetermined`
    pub fn score(value: u8) -> Self {
        if Self::SCALE.contains(&value) {
            Verdict::Score(value)
        } else {
            Verdict::Undetermined
        }
    }

    pub fn as_score(&self) -> Option<u8> {
        match self {
            Verdict::Score(s) => Some(*s),
            _ => None,
        }
    }
}

/// A judged groundedness verdict for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundednessVerdict {
    pub verdict: Verdict,
    /// The model declined to answer
    pub abstained: bool,
    /// The answer text that was judged
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}
