//! Token streaming between a generation producer and its consumer.
//!
//! One producer thread per stream sends [`TokenEvent`]s over a channel and always finishes
//! with a terminal `Done` or `Failed` event. The consumer pulls through [`TokenStream`], an
//! iterator that ends at the terminal event. Cancellation is cooperative: the producer
//! checks the shared [`CancelToken`] between tokens, and a dropped consumer makes the next
//! send fail.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use regqa_core::error::{codes, AppError};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    Token(String),
    Done,
    Failed(AppError),
}

/// Producer half handed to the closure passed to [`TokenStream::spawn`].
#[derive(Debug)]
pub struct TokenSender {
    tx: Sender<TokenEvent>,
    cancel: CancelToken,
}

impl TokenSender {
    /// Send one token. Returns `false` when the producer should stop: cancellation was
    /// requested or the consumer went away.
    pub fn send(&self, token: impl Into<String>) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tx.send(TokenEvent::Token(token.into())).is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
pub struct TokenStream {
    rx: Receiver<TokenEvent>,
    cancel: CancelToken,
    finished: bool,
}

impl TokenStream {
    /// Run `produce` on its own thread. `Ok(())` ends the stream with `Done`, an error with
    /// `Failed`.
    pub fn spawn<F>(cancel: CancelToken, produce: F) -> Result<Self, AppError>
    where
        F: FnOnce(&TokenSender) -> Result<(), AppError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let sender = TokenSender {
            tx: tx.clone(),
            cancel: cancel.clone(),
        };

        thread::Builder::new()
            .name("regqa-token-stream".to_string())
            .spawn(move || {
                let terminal = match produce(&sender) {
                    Ok(()) => TokenEvent::Done,
                    Err(e) => TokenEvent::Failed(e),
                };
                // The consumer may already be gone.
                let _ = tx.send(terminal);
            })
            .map_err(|e| {
                AppError::new(codes::GENERATION_FAILED, "Failed to start token stream")
                    .with_details(e.to_string())
            })?;

        Ok(Self {
            rx,
            cancel,
            finished: false,
        })
    }

    /// A stream over already-known tokens, terminated by `Done`. No thread involved.
    pub fn from_tokens<I, S>(tokens: I, cancel: CancelToken) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, rx) = mpsc::channel();
        for t in tokens {
            let _ = tx.send(TokenEvent::Token(t.into()));
        }
        let _ = tx.send(TokenEvent::Done);
        Self {
            rx,
            cancel,
            finished: false,
        }
    }

    /// Drain the stream into one string, stopping at the first failure.
    pub fn collect_text(self) -> Result<String, AppError> {
        let mut out = String::new();
        for token in self {
            out.push_str(&token?);
        }
        Ok(out)
    }
}

impl Iterator for TokenStream {
    type Item = Result<String, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return None;
        }

        match self.rx.recv() {
            Ok(TokenEvent::Token(t)) => Some(Ok(t)),
            Ok(TokenEvent::Done) => {
                self.finished = true;
                None
            }
            Ok(TokenEvent::Failed(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            Err(_) => {
                // Producer exited without a terminal event (panic).
                self.finished = true;
                Some(Err(AppError::new(
                    codes::GENERATION_FAILED,
                    "Token stream ended unexpectedly",
                )))
            }
        }
    }
}
