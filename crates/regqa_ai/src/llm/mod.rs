use regqa_core::error::AppError;

pub mod ollama_llm;
pub mod stream;

pub use ollama_llm::OllamaLlm;
pub use stream::{CancelToken, TokenEvent, TokenSender, TokenStream};

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub model: String,
    pub temperature: f32,
}

/// Generation collaborator: plain text in, plain text out.
pub trait Llm: Send + Sync {
    fn generate(&self, options: &GenerationOptions, prompt: &str) -> Result<String, AppError>;

    /// Start generating and hand back a stream of tokens. The producer stops when `cancel`
    /// is triggered or the returned stream is dropped.
    fn stream(
        &self,
        options: &GenerationOptions,
        prompt: String,
        cancel: CancelToken,
    ) -> Result<TokenStream, AppError>;
}
