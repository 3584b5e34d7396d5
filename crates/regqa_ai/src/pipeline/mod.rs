//! Retrieval → generation → formatting, synchronous and streaming.
use regqa_core::domain::ChunkMetadata;
use regqa_core::error::AppError;

use crate::answer::AnswerGenerator;
use crate::format::{format_response, partial_response};
use crate::llm::{CancelToken, TokenStream};
use crate::retrieve::RetrievalEngine;

pub const DEFAULT_N_RESULTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Retrieving,
    Generating,
    Formatting,
    Done,
}

#[derive(Clone)]
pub struct RagPipeline {
    retrieval: RetrievalEngine,
    generator: AnswerGenerator,
    n_results: usize,
}

impl RagPipeline {
    pub fn new(retrieval: RetrievalEngine, generator: AnswerGenerator, n_results: usize) -> Self {
        Self {
            retrieval,
            generator,
            n_results,
        }
    }

    pub fn query(&self, question: &str) -> Result<String, AppError> {
        self.query_with_k(question, self.n_results)
    }

    pub fn query_with_k(&self, question: &str, k: usize) -> Result<String, AppError> {
        tracing::debug!(phase = ?StreamPhase::Retrieving, "query");
        let r = self.retrieval.retrieve(question, k)?;
        tracing::debug!(phase = ?StreamPhase::Generating, "query");
        let answer = self.generator.answer(question, &r.context)?;
        tracing::debug!(phase = ?StreamPhase::Formatting, "query");
        let out = format_response(question, &answer, &r.documents, &r.metadatas);
        tracing::debug!(phase = ?StreamPhase::Done, "query");
        Ok(out)
    }

    /// Retrieval runs before this returns, so its errors surface here rather than mid-stream.
    pub fn query_streaming(
        &self,
        question: &str,
        cancel: CancelToken,
    ) -> Result<QueryStream, AppError> {
        self.query_streaming_with_k(question, self.n_results, cancel)
    }

    pub fn query_streaming_with_k(
        &self,
        question: &str,
        k: usize,
        cancel: CancelToken,
    ) -> Result<QueryStream, AppError> {
        tracing::debug!(phase = ?StreamPhase::Retrieving, "streaming query");
        let r = self.retrieval.retrieve(question, k)?;
        let tokens = self
            .generator
            .stream_answer(question, &r.context, cancel.clone())?;
        tracing::debug!(phase = ?StreamPhase::Generating, "streaming query");
        Ok(QueryStream {
            question: question.to_string(),
            documents: r.documents,
            metadatas: r.metadatas,
            tokens,
            cancel,
            answer: String::new(),
            phase: StreamPhase::Generating,
        })
    }
}

/// Emits the partial render after every token, then the final formatted response once.
/// Each item fully replaces the previous one.
#[derive(Debug)]
pub struct QueryStream {
    question: String,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
    tokens: TokenStream,
    cancel: CancelToken,
    answer: String,
    phase: StreamPhase,
}

impl QueryStream {
    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn answer_so_far(&self) -> &str {
        &self.answer
    }
}

impl Iterator for QueryStream {
    type Item = Result<String, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.phase == StreamPhase::Done {
            return None;
        }
        if self.cancel.is_cancelled() {
            tracing::debug!(
                answer_chars = self.answer.chars().count(),
                "streaming query cancelled"
            );
            self.phase = StreamPhase::Done;
            return None;
        }

        match self.tokens.next() {
            Some(Ok(token)) => {
                self.answer.push_str(&token);
                Some(Ok(partial_response(&self.question, &self.answer)))
            }
            Some(Err(e)) => {
                self.phase = StreamPhase::Done;
                Some(Err(e))
            }
            None if self.cancel.is_cancelled() => {
                self.phase = StreamPhase::Done;
                None
            }
            None => {
                self.phase = StreamPhase::Formatting;
                tracing::debug!(phase = ?self.phase, "streaming query");
                let out = format_response(
                    &self.question,
                    &self.answer,
                    &self.documents,
                    &self.metadatas,
                );
                self.phase = StreamPhase::Done;
                tracing::debug!(phase = ?self.phase, "streaming query");
                Some(Ok(out))
            }
        }
    }
}
