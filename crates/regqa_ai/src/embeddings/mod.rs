use regqa_core::error::AppError;

/// Embedding collaborator. Implementations must return one vector per input, all of the
/// same dimensionality for a given model, deterministically for identical input.
pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError>;
}

pub mod ollama_embed;

pub use ollama_embed::OllamaEmbedder;
