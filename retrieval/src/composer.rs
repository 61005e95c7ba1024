//! Answer composition from retrieved context.

use std::sync::Arc;

use tracing::debug;

use crate::config::DEFAULT_INSTRUCTION;
use crate::error::Result;
use crate::generation::TextGenerator;

/// Combines retrieved units and a question into a single generation request.
pub struct AnswerComposer {
    generator: Arc<dyn TextGenerator>,
    instruction: String,
}

impl AnswerComposer {
    /// Create a composer using the default instruction.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            instruction: DEFAULT_INSTRUCTION.to_string(),
        }
    }

    /// Replace the instruction placed at the top of the prompt.
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    /// Build the prompt. With no context units the context block is omitted.
    pub fn build_prompt(&self, context_units: &[String], question: &str) -> String {
        let mut prompt = String::new();
        prompt.push_str(self.instruction.trim());
        prompt.push_str("\n\n");

        if !context_units.is_empty() {
            prompt.push_str("Context:\n");
            for unit in context_units {
                prompt.push_str(unit);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str("User question: ");
        prompt.push_str(question.trim());
        prompt.push_str("\n\nAnswer:");
        prompt
    }

    /// Generate an answer, trimmed of surrounding whitespace.
    pub async fn compose(&self, context_units: &[String], question: &str) -> Result<String> {
        let prompt = self.build_prompt(context_units, question);
        debug!(
            "Composing answer from {} context units with {}",
            context_units.len(),
            self.generator.name()
        );
        let answer = self.generator.generate(&prompt).await?;
        Ok(answer.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GenerationError, RetrievalError};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        fn name(&self) -> &str {
            "recording"
        }

        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            if self.fail {
                return Err(GenerationError::NotConfigured("offline".to_string()));
            }
            if let Ok(mut prompts) = self.prompts.lock() {
                prompts.push(prompt.to_string());
            }
            Ok("  Paris.\n".to_string())
        }
    }

    #[test]
    fn test_prompt_with_context() {
        let composer = AnswerComposer::new(Arc::new(RecordingGenerator::default()))
            .with_instruction("Be brief.");
        let prompt = composer.build_prompt(
            &["capital France Paris".to_string(), "Paris Seine".to_string()],
            " What is the capital of France? ",
        );

        assert_eq!(
            prompt,
            "Be brief.\n\nContext:\ncapital France Paris\nParis Seine\n\n\
             User question: What is the capital of France?\n\nAnswer:"
        );
    }

    #[test]
    fn test_prompt_without_context() {
        let composer = AnswerComposer::new(Arc::new(RecordingGenerator::default()))
            .with_instruction("Be brief.");
        let prompt = composer.build_prompt(&[], "Hello?");
        assert_eq!(prompt, "Be brief.\n\nUser question: Hello?\n\nAnswer:");
    }

    #[tokio::test]
    async fn test_compose_trims_answer() {
        let generator = Arc::new(RecordingGenerator::default());
        let composer = AnswerComposer::new(generator.clone());

        let answer = composer
            .compose(&["capital France Paris".to_string()], "Capital?")
            .await
            .unwrap();

        assert_eq!(answer, "Paris.");
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with(DEFAULT_INSTRUCTION));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let composer = AnswerComposer::new(Arc::new(RecordingGenerator {
            fail: true,
            ..RecordingGenerator::default()
        }));

        let err = composer.compose(&[], "Capital?").await.unwrap_err();
        assert!(matches!(err, RetrievalError::GenerationUnavailable(_)));
    }
}
