
use tracing::{debug, info, warn};

use super::client::ChatBackend;
use super::conversation::{ChatSession, Message};
use super::prompts::{QuickAction, build_system_prompt};
use crate::embeddings::Embedder;
use crate::retrieval::RetrievalBridge;
use crate::{AssistError, Result};

/// Drives retrieval-augmented, streamed chat turns
pub struct ChatOrchestrator<B, E: Embedder> {
    backend: B,
    retrieval: Option<RetrievalBridge<E>>,
    top_k: usize,
}

impl<B: ChatBackend, E: Embedder> ChatOrchestrator<B, E> {
    /// Orchestrator that answers without a knowledge base
    #[inline]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            retrieval: None,
            top_k: 3,
        }
    }

    #[inline]
    pub fn with_retrieval(mut self, bridge: RetrievalBridge<E>) -> Self {
        self.top_k = bridge.config().top_k;
        self.retrieval = Some(bridge);
        self
    }

    #[inline]
    pub fn retrieval(&self) -> Option<&RetrievalBridge<E>> {
        self.retrieval.as_ref()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Re-check whether the knowledge base exists and record it on the session
    #[inline]
    pub async fn refresh_readiness(&self, session: &mut ChatSession) -> bool {
        let ready = match &self.retrieval {
            Some(bridge) => bridge.is_ready().await,
            None => false,
        };
        session.knowledge_base_ready = ready;
        ready
    }

    async fn context_for(&self, session: &ChatSession, input: &str) -> String {
        if !session.knowledge_base_ready {
            return String::new();
        }
        match &self.retrieval {
            Some(bridge) => bridge.retrieve(input, self.top_k).await,
            None => String::new(),
        }
    }

    /// Run one chat turn, forwarding each streamed delta to `on_token`.
    ///
    /// History gains the user message and the full reply only once the
    /// stream completes; on any error it is left exactly as it was.
    #[inline]
    pub async fn turn<F>(
        &self,
        session: &mut ChatSession,
        input: &str,
        mut on_token: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let input = input.trim();
        if input.is_empty() {
            return Err(AssistError::Chat("Message is empty".to_string()));
        }

        let context = self.context_for(session, input).await;
        if context.is_empty() {
            debug!("Answering without reference material");
        } else {
            debug!("Augmenting turn with {} bytes of context", context.len());
        }
        session
            .conversation
            .set_system_prompt(build_system_prompt(&context));

        let user_message = Message::user(input);
        let mut messages = session.conversation.request_messages();
        messages.push(user_message.clone());

        let stream = self.backend.stream_chat(&messages).map_err(|e| {
            warn!("Chat request failed: {:#}", e);
            AssistError::Chat(format!("{:#}", e))
        })?;

        let mut reply = String::new();
        for token in stream {
            let token = token.map_err(|e| {
                warn!("Chat stream aborted after {} bytes: {:#}", reply.len(), e);
                AssistError::Chat(format!("{:#}", e))
            })?;
            on_token(&token);
            reply.push_str(&token);
        }

        session.conversation.push(user_message);
        session.conversation.push(Message::assistant(reply.clone()));
        info!(
            "Chat turn complete ({} messages in history)",
            session.conversation.len()
        );

        Ok(reply)
    }

    /// Start a fresh conversation with a canned diagnostic question
    #[inline]
    pub async fn quick_action<F>(
        &self,
        session: &mut ChatSession,
        action: QuickAction,
        on_token: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        debug!("Running quick action: {}", action.label());
        Self::reset(session);
        self.turn(session, action.prompt(), on_token).await
    }

    #[inline]
    pub fn reset(session: &mut ChatSession) {
        session.conversation.clear();
    }
}
