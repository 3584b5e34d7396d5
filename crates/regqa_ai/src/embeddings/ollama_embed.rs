use std::time::Duration;

use regqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

const EMBED_TIMEOUT: Duration = Duration::from_secs(60);
// Per-input cap; regulation points are far below this.
const MAX_INPUT_CHARS: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

fn bounded(input: &str) -> &str {
    match input.char_indices().nth(MAX_INPUT_CHARS) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.client.endpoint("api/embed");
        let req = EmbedRequest {
            model,
            input: inputs.iter().map(|s| bounded(s)).collect(),
        };
        let resp = ureq::post(&url).timeout(EMBED_TIMEOUT).send_json(&req);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: EmbedResponse = r.into_json().map_err(|e| {
                    AppError::new(codes::EMBEDDINGS_FAILED, "Failed to decode embeddings response")
                        .with_details(e.to_string())
                })?;
                if v.embeddings.len() != inputs.len() {
                    return Err(AppError::new(
                        codes::EMBEDDINGS_FAILED,
                        "Embeddings response size does not match request",
                    )
                    .with_details(format!(
                        "requested={}; received={}",
                        inputs.len(),
                        v.embeddings.len()
                    )));
                }
                if v.embeddings.iter().any(|e| e.is_empty()) {
                    return Err(AppError::new(
                        codes::EMBEDDINGS_FAILED,
                        "Embeddings response contained an empty vector",
                    ));
                }
                Ok(v.embeddings)
            }
            Ok(r) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Embeddings request failed")
                    .with_details(format!("status={}", r.status())),
            ),
            Err(ureq::Error::Status(status, r)) => Err(AppError::new(
                codes::EMBEDDINGS_FAILED,
                "Embeddings request failed",
            )
            .with_details(format!(
                "model={model}; status={status}; body={}",
                r.into_string().unwrap_or_default()
            ))),
            Err(e) => Err(
                AppError::new(codes::EMBEDDINGS_FAILED, "Failed to call embeddings endpoint")
                    .with_details(format!("url={url}; err={e}"))
                    .with_retryable(true),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::bounded;

    #[test]
    fn bounds_inputs_on_char_boundaries() {
        let long = "я".repeat(12_500);
        assert_eq!(bounded(&long).chars().count(), 12_000);
        assert_eq!(bounded("short"), "short");
    }
}
