#[cfg(test)]
mod tests;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use tracing::{debug, warn};

use super::conversation::{Message, ToolCall};
use crate::config::ProviderConfig;
use crate::provider::ProviderClient;

const COMPLETIONS_PATH: &str = "chat/completions";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental assistant text, pulled one delta at a time.
///
/// Dropping the stream abandons the response.
pub type TokenStream = Box<dyn Iterator<Item = Result<String>>>;

/// Result of a non-streaming completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

/// Chat completion service
pub trait ChatBackend {
    /// Start a streamed completion over `messages`
    fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream>;

    /// Request a complete response, optionally advertising `tools`
    fn complete(
        &self,
        messages: &[Message],
        tools: Option<&serde_json::Value>,
    ) -> Result<Completion>;
}

impl<B: ChatBackend + ?Sized> ChatBackend for &B {
    #[inline]
    fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream> {
        (**self).stream_chat(messages)
    }

    #[inline]
    fn complete(
        &self,
        messages: &[Message],
        tools: Option<&serde_json::Value>,
    ) -> Result<Completion> {
        (**self).complete(messages, tools)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ProviderErrorBody {
    fn into_error(self) -> anyhow::Error {
        match self.code {
            Some(code) => anyhow!("Provider error {}: {}", code, self.message),
            None => anyhow!("Provider error: {}", self.message),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    error: Option<ProviderErrorBody>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Server-sent event reader over a chat completion response.
///
/// Yields each non-empty content delta; ends at `[DONE]` or end of body.
/// A provider error object or read failure is yielded once as `Err` and
/// ends the stream.
pub struct ChatStream<R> {
    reader: R,
    line: String,
    finished: bool,
}

impl<R: BufRead> ChatStream<R> {
    #[inline]
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            finished: false,
        }
    }

    fn parse_event(data: &str) -> Result<Option<String>> {
        let chunk: StreamChunk =
            serde_json::from_str(data).context("Failed to parse stream chunk")?;

        if let Some(error) = chunk.error {
            return Err(error.into_error());
        }

        let text: String = chunk
            .choices
            .into_iter()
            .filter_map(|choice| choice.delta.content)
            .collect();

        Ok((!text.is_empty()).then_some(text))
    }
}

impl<R: BufRead> Iterator for ChatStream<R> {
    type Item = Result<String>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.finished = true;
                }
                Ok(_) => {
                    let line = self.line.trim();
                    let Some(data) = line.strip_prefix("data:") else {
                        // blank keep-alives, comments, event/id fields
                        continue;
                    };
                    let data = data.trim();

                    if data == DONE_SENTINEL {
                        self.finished = true;
                        continue;
                    }

                    match Self::parse_event(data) {
                        Ok(Some(text)) => return Some(Ok(text)),
                        Ok(None) => {}
                        Err(e) => {
                            self.finished = true;
                            return Some(Err(e));
                        }
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(anyhow!(e).context("Failed to read chat stream")));
                }
            }
        }

        None
    }
}

impl<R: BufRead> std::iter::FusedIterator for ChatStream<R> {}

/// Chat adapter for the hosted `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct ChatClient {
    provider: ProviderClient,
    model: String,
    temperature: f32,
}

impl ChatClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let provider =
            ProviderClient::new(config).context("Failed to initialize provider client")?;
        Ok(Self::from_provider(provider, config))
    }

    #[inline]
    pub fn from_provider(provider: ProviderClient, config: &ProviderConfig) -> Self {
        Self {
            provider,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(
        &self,
        messages: &[Message],
        stream: bool,
        tools: Option<&serde_json::Value>,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            stream,
            tools,
            tool_choice: tools.map(|_| "auto"),
        };
        serde_json::to_string(&request).context("Failed to serialize chat request")
    }
}

impl ChatBackend for ChatClient {
    #[inline]
    fn stream_chat(&self, messages: &[Message]) -> Result<TokenStream> {
        debug!(
            "Starting streamed chat with {} messages using {}",
            messages.len(),
            self.model
        );

        let body = self.request_body(messages, true, None)?;
        let reader = self
            .provider
            .post_streaming(COMPLETIONS_PATH, &body)
            .context("Failed to start chat completion")?;

        Ok(Box::new(ChatStream::new(BufReader::new(reader))))
    }

    #[inline]
    fn complete(
        &self,
        messages: &[Message],
        tools: Option<&serde_json::Value>,
    ) -> Result<Completion> {
        debug!(
            "Requesting completion with {} messages using {}",
            messages.len(),
            self.model
        );

        let body = self.request_body(messages, false, tools)?;
        let response_text = self
            .provider
            .post_json(COMPLETIONS_PATH, &body)
            .context("Chat completion request failed")?;

        let response: CompletionResponse = serde_json::from_str(&response_text)
            .context("Failed to parse chat completion response")?;

        if let Some(error) = response.error {
            return Err(error.into_error());
        }

        let Some(choice) = response.choices.into_iter().next() else {
            warn!("Chat completion returned no choices");
            return Err(anyhow!("Chat completion returned no choices"));
        };

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}
