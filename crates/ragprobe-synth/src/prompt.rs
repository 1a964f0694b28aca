//! Prompts for question synthesis and parsing of the structured reply

use serde::Deserialize;

use ragprobe_core::{ControlParams, Error, Result, strip_code_fence};

const GROUNDED_SYSTEM_MESSAGE: &str = "\
You write evaluation questions for a document question-answering assistant.
You are given a MAIN CHUNK and several SIMILAR CHUNKS from the same knowledge base.
Write a question a real user could ask whose complete answer is contained in the supplied chunks.
The answer must be fully supported by the supplied text: do not use outside knowledge.
Prefer questions that need the MAIN CHUNK; combining it with similar chunks is allowed.
Reply with a JSON object with the keys \"question\", \"response\" and \"explanation\", each a list holding one string.
\"response\" is the correct answer; \"explanation\" says which chunk(s) support it.";

const NOT_GROUNDED_SYSTEM_MESSAGE: &str = "\
You write evaluation questions that test whether a document question-answering assistant admits missing information.
You are given a MAIN CHUNK and several SIMILAR CHUNKS from the same knowledge base.
Write a question that stays on the topic of the chunks and sounds answerable, but whose answer is NOT contained in any supplied chunk.
Do not write questions that are obviously unrelated to the chunks.
Reply with a JSON object with the keys \"question\", \"response\" and \"explanation\", each a list holding one string.
\"response\" is what a careful assistant should reply: state that the information is not available in the provided material.
\"explanation\" names the missing information and why no chunk contains it.";

const DEFAULT_TASK: &str = "\
Generate exactly one question and its response following the parameters above. \
Match the requested difficulty, tone and language, and keep the question close to the requested length.";

/// Builds system and user prompts for the generation service
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    grounded_system: String,
    not_grounded_system: String,
    task: String,
    instructions: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            grounded_system: GROUNDED_SYSTEM_MESSAGE.to_string(),
            not_grounded_system: NOT_GROUNDED_SYSTEM_MESSAGE.to_string(),
            task: DEFAULT_TASK.to_string(),
            instructions: "None".to_string(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace both system messages
    pub fn with_system_messages(mut self, grounded: impl Into<String>, not_grounded: impl Into<String>) -> Self {
        self.grounded_system = grounded.into();
        self.not_grounded_system = not_grounded.into();
        self
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn system_message(&self, is_grounded: bool) -> &str {
        if is_grounded {
            &self.grounded_system
        } else {
            &self.not_grounded_system
        }
    }

    /// User prompt with the main chunk and its neighbors clearly separated
    pub fn user_prompt(&self, main_chunk: &str, similar_chunks: &[String], params: &ControlParams) -> String {
        let similar = similar_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("SIMILAR CHUNK {}:\n{}", i + 1, chunk))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        format!(
            "# MAIN CHUNK:\n{main}\n\n\
             # SIMILAR CHUNKS:\n{similar}\n\n\
             # Domain:\n{domain}\n\n\
             # Difficulty:\n{difficulty}\n\n\
             # Tone:\n{tone}\n\n\
             # Language:\n{language}\n\n\
             # Topic:\n{topic}\n\n\
             # Instructions:\n{instructions}\n\n\
             # Question Length (number of words):\n{length}\n\n\
             # Task:\n{task}\n\n\
             # Grounded: {grounded}\n",
            main = main_chunk,
            similar = similar,
            domain = params.domain,
            difficulty = params.difficulty,
            tone = params.tone,
            language = params.language,
            topic = params.topic,
            instructions = self.instructions,
            length = params.question_length,
            task = self.task,
            grounded = params.is_grounded,
        )
    }
}

/// One question/answer pair parsed from the generation service
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPair {
    pub question: String,
    pub answer: String,
    pub explanation: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn first(self) -> Option<String> {
        match self {
            OneOrMany::One(s) => Some(s),
            OneOrMany::Many(v) => v.into_iter().next(),
        }
    }
}

#[derive(Deserialize)]
struct RawPair {
    question: Option<OneOrMany>,
    response: Option<OneOrMany>,
    explanation: Option<OneOrMany>,
}

/// Parse `{"question": [..], "response": [..], "explanation": [..]}`.
///
/// A missing question or response, or an empty one, is a generation error.
pub fn parse_generated_pair(text: &str) -> Result<GeneratedPair> {
    let raw: RawPair = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| Error::Generation(format!("response is not the expected JSON object: {}", e)))?;

    let field = |value: Option<OneOrMany>, name: &str| -> Result<String> {
        value
            .and_then(OneOrMany::first)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Generation(format!("missing or empty '{}'", name)))
    };

    Ok(GeneratedPair {
        question: field(raw.question, "question")?,
        answer: field(raw.response, "response")?,
        explanation: raw
            .explanation
            .and_then(OneOrMany::first)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    })
}
