//! Conversation engine
//!
//! Answers one user message at a time: retrieves context from the persona's
//! knowledge base, assembles the prompt with a bounded history window,
//! streams the reply from the inference provider and records the exchange.
//!
//! History stays consistent on every exit path. A user turn is only added
//! together with the assistant turn that answered it, and interrupted or
//! failed replies carry a [`TurnStatus`] marker.

use crate::config::{Config, ConversationConfig, RagConfig};
use crate::conversation::{ChatHistory, TurnStatus};
use crate::error::{RagPersonaError, Result};
use crate::persona::{Persona, PersonaStore};
use crate::prompts::{build_persona_prompt, PromptParts};
use crate::providers::{
    generation_options, GenerationEvent, GenerationOptions, GenerationRequest, Provider,
    TokenUsage,
};
use crate::rag::{RetrievedChunk, Retriever};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Assistant reply to one user message
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Concatenated fragments
    pub text: String,
    /// `Complete`, or `Incomplete` if the stream ended without its terminal event
    pub status: TurnStatus,
    pub usage: Option<TokenUsage>,
    /// Context the reply was grounded on, highest score first
    pub context: Vec<RetrievedChunk>,
}

/// How one streaming attempt ended
enum StreamEnd {
    Done(Option<TokenUsage>),
    Truncated,
    Cancelled,
}

/// Retrieval-augmented chat over one inference provider
pub struct ConversationEngine {
    provider: Arc<dyn Provider>,
    store: Arc<PersonaStore>,
    retriever: Retriever,
    model: String,
    options: GenerationOptions,
    rag: RagConfig,
    conversation: ConversationConfig,
}

impl ConversationEngine {
    /// Creates an engine using the chat model and sampling options from `config`
    pub fn new(provider: Arc<dyn Provider>, store: Arc<PersonaStore>, config: &Config) -> Self {
        let retriever = Retriever::new(Arc::clone(store.index()));
        Self {
            provider,
            store,
            retriever,
            model: config.ollama.model.clone(),
            options: generation_options(&config.ollama),
            rag: config.rag.clone(),
            conversation: config.conversation.clone(),
        }
    }

    /// Model replies are generated with
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Answer `user_message` as `persona`, forwarding fragments as they arrive
    ///
    /// On return the exchange has been appended to `history`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a blank message, and retrieval errors such as
    ///   `ConfigurationMismatch`; history is left untouched.
    /// - `CancelledGeneration` when `cancel` fires; the partial reply is
    ///   recorded as an incomplete turn.
    /// - Inference errors (`InferenceUnavailable`, `ModelNotFound`) once the
    ///   single retry is spent; the reply is recorded as a failed turn.
    pub async fn respond<F>(
        &self,
        persona: &Persona,
        user_message: &str,
        history: &mut ChatHistory,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> Result<Reply>
    where
        F: FnMut(&str),
    {
        let user_message = user_message.trim();
        if user_message.is_empty() {
            return Err(RagPersonaError::InvalidInput("message cannot be empty".to_string()).into());
        }

        let context = self
            .retriever
            .retrieve(&persona.id, user_message, self.rag.top_k)
            .await?;
        debug!(persona = %persona.name, chunks = context.len(), "Retrieved context");

        let window = history.window(
            self.conversation.max_history_turns,
            self.conversation.max_history_tokens,
        );
        let prompt = build_persona_prompt(&PromptParts {
            persona,
            context: &context,
            history: window,
            user_message,
            max_chunk_chars: self.rag.chunk_size,
        });
        let request = GenerationRequest {
            model: self.model.clone(),
            prompt,
            options: self.options,
        };

        let mut text = String::new();
        let mut attempt = 0;
        let end = loop {
            attempt += 1;
            match self
                .stream_once(&request, cancel, &mut text, &mut on_fragment)
                .await
            {
                Ok(end) => break end,
                Err(e) => {
                    if attempt > 1 || !text.is_empty() || !is_retryable(&e) {
                        warn!(persona = %persona.name, error = %e, "Generation failed");
                        history.record_exchange(user_message, text, TurnStatus::Failed);
                        return Err(e);
                    }

                    warn!(
                        error = %e,
                        backoff_ms = self.conversation.retry_backoff_ms,
                        "Inference unavailable, retrying once"
                    );
                    let backoff = Duration::from_millis(self.conversation.retry_backoff_ms);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break StreamEnd::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        match end {
            StreamEnd::Done(usage) => {
                history.record_exchange(user_message, text.clone(), TurnStatus::Complete);
                self.touch(persona);
                Ok(Reply {
                    text,
                    status: TurnStatus::Complete,
                    usage,
                    context,
                })
            }
            StreamEnd::Truncated => {
                warn!(persona = %persona.name, "Reply stream ended early");
                history.record_exchange(user_message, text.clone(), TurnStatus::Incomplete);
                self.touch(persona);
                Ok(Reply {
                    text,
                    status: TurnStatus::Incomplete,
                    usage: None,
                    context,
                })
            }
            StreamEnd::Cancelled => {
                info!(persona = %persona.name, chars = text.len(), "Generation cancelled");
                let kept = if self.conversation.persist_incomplete {
                    text
                } else {
                    String::new()
                };
                history.record_exchange(user_message, kept, TurnStatus::Incomplete);
                Err(RagPersonaError::CancelledGeneration.into())
            }
        }
    }

    /// Dispatch once and pull fragments until the stream ends or `cancel` fires
    async fn stream_once<F>(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        text: &mut String,
        on_fragment: &mut F,
    ) -> Result<StreamEnd>
    where
        F: FnMut(&str),
    {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
            stream = self.provider.generate(request) => stream?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(StreamEnd::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(GenerationEvent::Fragment(fragment))) => {
                    on_fragment(&fragment);
                    text.push_str(&fragment);
                }
                Some(Ok(GenerationEvent::Done { usage })) => return Ok(StreamEnd::Done(usage)),
                Some(Err(e)) => return Err(e),
                None => return Ok(StreamEnd::Truncated),
            }
        }
    }

    fn touch(&self, persona: &Persona) {
        if let Err(e) = self.store.touch(&persona.id) {
            warn!(persona = %persona.name, error = %e, "Failed to record last interaction");
        }
    }
}

fn is_retryable(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<RagPersonaError>())
        .any(RagPersonaError::is_retryable)
}
