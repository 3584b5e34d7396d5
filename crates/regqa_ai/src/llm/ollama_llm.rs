use std::io::{BufRead, BufReader};
use std::time::Duration;

use regqa_core::error::{codes, AppError};
use serde::{Deserialize, Serialize};

use super::stream::{CancelToken, TokenStream};
use super::{GenerationOptions, Llm};
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
    timeout: Duration,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptionsBody {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptionsBody,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// One NDJSON line of a streaming `/api/generate` response.
#[derive(Debug, Clone, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

fn call_error(url: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, r) => {
            AppError::new(codes::GENERATION_FAILED, "Generation request failed").with_details(
                format!("status={status}; body={}", r.into_string().unwrap_or_default()),
            )
        }
        e => AppError::new(codes::GENERATION_FAILED, "Failed to call generation endpoint")
            .with_details(format!("url={url}; err={e}"))
            .with_retryable(true),
    }
}

fn parse_chunk(line: &str) -> Result<GenerateChunk, AppError> {
    let chunk: GenerateChunk = serde_json::from_str(line).map_err(|e| {
        AppError::new(codes::GENERATION_FAILED, "Failed to decode streamed generation chunk")
            .with_details(e.to_string())
    })?;
    if let Some(err) = chunk.error.as_deref() {
        return Err(
            AppError::new(codes::GENERATION_FAILED, "Model reported an error mid-stream")
                .with_details(err.to_string()),
        );
    }
    Ok(chunk)
}

impl Llm for OllamaLlm {
    fn generate(&self, options: &GenerationOptions, prompt: &str) -> Result<String, AppError> {
        let url = self.client.endpoint("api/generate");
        let req = GenerateRequest {
            model: &options.model,
            prompt,
            stream: false,
            options: GenerateOptionsBody {
                temperature: options.temperature,
            },
        };

        let r = ureq::post(&url)
            .timeout(self.timeout)
            .send_json(&req)
            .map_err(|e| call_error(&url, e))?;
        let v: GenerateResponse = r.into_json().map_err(|e| {
            AppError::new(codes::GENERATION_FAILED, "Failed to decode generation response")
                .with_details(e.to_string())
                .with_retryable(true)
        })?;
        if v.response.trim().is_empty() {
            return Err(AppError::new(
                codes::GENERATION_FAILED,
                "Generation response was empty",
            ));
        }
        Ok(v.response)
    }

    fn stream(
        &self,
        options: &GenerationOptions,
        prompt: String,
        cancel: CancelToken,
    ) -> Result<TokenStream, AppError> {
        let url = self.client.endpoint("api/generate");
        let timeout = self.timeout;
        let options = options.clone();

        TokenStream::spawn(cancel, move |out| {
            let req = GenerateRequest {
                model: &options.model,
                prompt: &prompt,
                stream: true,
                options: GenerateOptionsBody {
                    temperature: options.temperature,
                },
            };
            let r = ureq::post(&url)
                .timeout(timeout)
                .send_json(&req)
                .map_err(|e| call_error(&url, e))?;

            let reader = BufReader::new(r.into_reader());
            for line in reader.lines() {
                if out.is_cancelled() {
                    tracing::debug!("generation stream cancelled");
                    break;
                }
                let line = line.map_err(|e| {
                    AppError::new(codes::GENERATION_FAILED, "Generation stream interrupted")
                        .with_details(e.to_string())
                        .with_retryable(true)
                })?;
                if line.trim().is_empty() {
                    continue;
                }
                let chunk = parse_chunk(&line)?;
                if !chunk.response.is_empty() && !out.send(chunk.response) {
                    tracing::debug!("generation stream stopped by consumer");
                    break;
                }
                if chunk.done {
                    break;
                }
            }
            Ok(())
        })
    }
}
