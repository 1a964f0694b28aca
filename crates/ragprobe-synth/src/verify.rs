//! Post-hoc check that a not-grounded question really is unanswerable
//!
//! The not-grounded system message only asks the model to avoid answerable
//! questions. This pass asks a model again, with only the chunk texts, and
//! rejects records it finds answerable.

use serde::Deserialize;
use std::sync::Arc;

use ragprobe_core::{Error, GenerationRequest, Generator, Result, strip_code_fence};


const VERIFY_SYSTEM_MESSAGE: &str = "\
You check evaluation data. Decide whether the QUESTION can be answered using only the CONTEXT.
Do not use outside knowledge. Partial answers count as answerable only if the core of the question is answered.
Reply with a JSON object: {\"answerable\": true|false, \"reason\": \"...\"}";

/// Result of an answerability check
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Answerability {
    pub answerable: bool,
    #[serde(default)]
    pub reason: String,
}

/// Asks a model whether a question is answerable from a chunk set
#[derive(Clone)]
pub struct UnanswerabilityCheck {
    generator: Arc<dyn Generator>,
}

impl UnanswerabilityCheck {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self { generator }
    }

    pub async fn check(&self, question: &str, context: &[String]) -> Result<Answerability> {
        let context_text = context
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n\n");
        let user = format!("# CONTEXT:\n{}\n\n# QUESTION:\n{}\n", context_text, question);

        let request = GenerationRequest::new(VERIFY_SYSTEM_MESSAGE, user)
            .with_json_response()
            .with_temperature(0.0);
        let reply = self.generator.generate(&request).await?;

        serde_json::from_str(strip_code_fence(&reply))
            .map_err(|e| Error::Generation(format!("unparseable answerability verdict: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            assert!(request.user.contains("# QUESTION:\nWho founded it?"));
            Ok(self.0.to_string())
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_parses_verdict() {
        let check = UnanswerabilityCheck::new(Arc::new(Fixed(
            r#"{"answerable": true, "reason": "chunk 2 names the founder"}"#,
        )));
        let verdict = check.check("Who founded it?", &["a".to_string()]).await.unwrap();
        assert!(verdict.answerable);
        assert_eq!(verdict.reason, "chunk 2 names the founder");
    }

    #[tokio::test]
    async fn test_garbage_is_an_error() {
        let check = UnanswerabilityCheck::new(Arc::new(Fixed("maybe?")));
        let result = check.check("Who founded it?", &[]).await;
        assert!(matches!(result, Err(Error::Generation(_))));
    }
}
