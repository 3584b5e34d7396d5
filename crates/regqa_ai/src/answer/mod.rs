use std::sync::Arc;

use regqa_core::error::AppError;

use crate::llm::{CancelToken, GenerationOptions, Llm, TokenStream};

pub mod prompts;

pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 4000;

/// First `max_chars` characters of `s` (Unicode scalar values, not bytes).
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn Llm>,
    options: GenerationOptions,
    max_context_chars: usize,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn Llm>, options: GenerationOptions, max_context_chars: usize) -> Self {
        Self {
            llm,
            options,
            max_context_chars,
        }
    }

    pub fn render_prompt(&self, question: &str, context: &str) -> String {
        let context = truncate_chars(context, self.max_context_chars);
        prompts::regulation_answer_prompt(context, question)
    }

    pub fn answer(&self, question: &str, context: &str) -> Result<String, AppError> {
        let prompt = self.render_prompt(question, context);
        tracing::debug!(
            model = %self.options.model,
            prompt_chars = prompt.chars().count(),
            "generating answer"
        );
        self.llm.generate(&self.options, &prompt)
    }

    pub fn stream_answer(
        &self,
        question: &str,
        context: &str,
        cancel: CancelToken,
    ) -> Result<TokenStream, AppError> {
        let prompt = self.render_prompt(question, context);
        tracing::debug!(
            model = %self.options.model,
            prompt_chars = prompt.chars().count(),
            "streaming answer"
        );
        self.llm.stream(&self.options, prompt, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_characters() {
        assert_eq!(truncate_chars("Статья", 3), "Ста");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn prompt_keeps_template_framing() {
        let p = prompts::regulation_answer_prompt("CTX", "Q?");
        assert!(p.starts_with("Vous êtes un expert en règlements techniques."));
        assert!(p.contains("\n\nDocumentation:\nCTX\n\nQuestion: Q?\n\n"));
        assert!(p.ends_with("citez les articles et points pertinents):"));
    }
}
