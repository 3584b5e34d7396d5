pub mod answer;
pub mod embeddings;
pub mod format;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod pipeline;
pub mod retrieve;
