use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use regqa_ai::answer::AnswerGenerator;
use regqa_ai::embeddings::Embedder;
use regqa_ai::index::{DistanceMetric, EmbeddingIndex, SqliteVectorIndex};
use regqa_ai::llm::{CancelToken, GenerationOptions, Llm, TokenStream};
use regqa_ai::pipeline::{RagPipeline, StreamPhase};
use regqa_ai::retrieve::RetrievalEngine;
use regqa_core::chunking::parse_regulation_to_chunks;
use regqa_core::error::{codes, AppError};

struct LengthEmbedder;

impl Embedder for LengthEmbedder {
    fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(inputs
            .iter()
            .map(|s| vec![s.chars().count() as f32, 1.0])
            .collect())
    }
}

/// Replays fixed tokens and records the last prompt it saw.
struct ScriptedLlm {
    tokens: Vec<&'static str>,
    fail_after: Option<usize>,
    last_prompt: Mutex<Option<String>>,
}

impl ScriptedLlm {
    fn new(tokens: Vec<&'static str>) -> Self {
        Self {
            tokens,
            fail_after: None,
            last_prompt: Mutex::new(None),
        }
    }

    fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone().expect("prompt recorded")
    }
}

impl Llm for ScriptedLlm {
    fn generate(&self, _options: &GenerationOptions, prompt: &str) -> Result<String, AppError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(self.tokens.concat())
    }

    fn stream(
        &self,
        _options: &GenerationOptions,
        prompt: String,
        cancel: CancelToken,
    ) -> Result<TokenStream, AppError> {
        *self.last_prompt.lock().unwrap() = Some(prompt);
        match self.fail_after {
            None => Ok(TokenStream::from_tokens(self.tokens.clone(), cancel)),
            Some(n) => {
                let tokens = self.tokens.clone();
                TokenStream::spawn(cancel, move |out| {
                    for t in tokens.into_iter().take(n) {
                        out.send(t);
                    }
                    Err(AppError::new(codes::GENERATION_FAILED, "connection reset"))
                })
            }
        }
    }
}

const REGULATION: &str = "Статья 5. Требования безопасности\n\
    1. Оборудование должно быть заземлено.\n\
    2. Проверка заземления проводится ежегодно.\n\
    Статья 6. Маркировка\n\
    1. Маркировка наносится на корпус изделия.\n";

fn pipeline(llm: Arc<ScriptedLlm>, max_context_chars: usize) -> RagPipeline {
    let (store, _) =
        SqliteVectorIndex::open_in_memory("regulation_collection", DistanceMetric::Cosine)
            .expect("open");
    let index = EmbeddingIndex::new(Box::new(store), Arc::new(LengthEmbedder), "mock", 32);
    index
        .build(&parse_regulation_to_chunks(REGULATION), false)
        .expect("build");
    let generator = AnswerGenerator::new(
        llm,
        GenerationOptions {
            model: "mock-llm".to_string(),
            temperature: 0.1,
        },
        max_context_chars,
    );
    RagPipeline::new(RetrievalEngine::new(Arc::new(index)), generator, 5)
}

#[test]
fn synchronous_query_formats_answer_with_sources() {
    let llm = Arc::new(ScriptedLlm::new(vec!["Voir ", "l'article 5."]));
    let out = pipeline(llm.clone(), 4000)
        .query("Как часто проверяется заземление?")
        .expect("query");

    assert!(out.starts_with(
        "**Question:** Как часто проверяется заземление?\n\n\
         **Réponse:** Voir l'article 5.\n\n**Sources:**\n"
    ));
    assert!(out.contains("\n1. **Article "));
    assert!(out.contains("\n3. **Article "));
    assert!(!out.contains("\n4. **Article "));

    let prompt = llm.last_prompt();
    assert!(prompt.contains("Question: Как часто проверяется заземление?"));
    assert!(prompt.contains("---SECTION---"));
}

#[test]
fn prompt_context_respects_character_budget() {
    let llm = Arc::new(ScriptedLlm::new(vec!["ok"]));
    pipeline(llm.clone(), 50).query("заземление").expect("query");

    let prompt = llm.last_prompt();
    let context = prompt
        .split("Documentation:\n")
        .nth(1)
        .and_then(|rest| rest.split("\n\nQuestion: ").next())
        .expect("context section");
    assert_eq!(context.chars().count(), 50);
}

#[test]
fn streaming_emits_partial_per_token_then_one_final() {
    let llm = Arc::new(ScriptedLlm::new(vec!["Le ", "point ", "5.2"]));
    let mut stream = pipeline(llm, 4000)
        .query_streaming("заземление", CancelToken::new())
        .expect("stream");
    assert_eq!(stream.phase(), StreamPhase::Generating);

    let emissions: Vec<String> = stream.by_ref().map(|e| e.expect("emission")).collect();
    assert_eq!(emissions.len(), 4);
    assert_eq!(emissions[0], "**Question:** заземление\n\n**Réponse:** Le ");
    assert_eq!(emissions[1], "**Question:** заземление\n\n**Réponse:** Le point ");
    assert_eq!(emissions[2], "**Question:** заземление\n\n**Réponse:** Le point 5.2");
    assert!(emissions[3]
        .starts_with("**Question:** заземление\n\n**Réponse:** Le point 5.2\n\n**Sources:**\n"));
    assert_eq!(emissions.iter().filter(|e| e.contains("**Sources:**")).count(), 1);

    assert_eq!(stream.phase(), StreamPhase::Done);
    assert_eq!(stream.answer_so_far(), "Le point 5.2");
    assert!(stream.next().is_none());
}

#[test]
fn cancellation_ends_stream_without_final_emission() {
    let llm = Arc::new(ScriptedLlm::new(vec!["un ", "deux ", "trois"]));
    let cancel = CancelToken::new();
    let mut stream = pipeline(llm, 4000)
        .query_streaming("заземление", cancel.clone())
        .expect("stream");

    let first = stream.next().expect("first").expect("partial");
    assert!(!first.contains("**Sources:**"));
    cancel.cancel();

    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
    assert_eq!(stream.phase(), StreamPhase::Done);
    assert_eq!(stream.answer_so_far(), "un ");
}

#[test]
fn token_failure_yields_one_error_and_ends() {
    let llm = Arc::new(ScriptedLlm {
        fail_after: Some(1),
        ..ScriptedLlm::new(vec!["un ", "deux "])
    });
    let items: Vec<Result<String, AppError>> = pipeline(llm, 4000)
        .query_streaming("заземление", CancelToken::new())
        .expect("stream")
        .collect();

    assert_eq!(items.len(), 2);
    assert!(items[0].is_ok());
    assert_eq!(
        items[1].as_ref().expect_err("failure").code,
        codes::GENERATION_FAILED
    );
}

#[test]
fn retrieval_errors_surface_before_streaming() {
    let llm = Arc::new(ScriptedLlm::new(vec!["x"]));
    let err = pipeline(llm, 4000)
        .query_streaming("  ", CancelToken::new())
        .expect_err("blank question");
    assert_eq!(err.code, codes::RETRIEVAL_EMPTY_QUESTION);
}
