//! Chat message model and session-scoped conversation state

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    #[inline]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that requested tool invocations
    #[inline]
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::assistant(content)
        }
    }

    /// Result of executing the tool call `call_id`
    #[inline]
    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: Some(name.into()),
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }
}

/// Ordered message history with a separately held system message.
///
/// The system message is replaced wholesale on every turn and always leads
/// the request; history never contains system messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    system: Option<Message>,
    history: Vec<Message>,
}

impl Conversation {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system: Some(Message::system(prompt)),
            history: Vec::new(),
        }
    }

    #[inline]
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system = Some(Message::system(prompt));
    }

    #[inline]
    pub fn system_prompt(&self) -> Option<&str> {
        self.system.as_ref().map(|m| m.content.as_str())
    }

    /// Append a message to history; system messages replace the system prompt
    #[inline]
    pub fn push(&mut self, message: Message) {
        if message.role == Role::System {
            self.system = Some(message);
        } else {
            self.history.push(message);
        }
    }

    #[inline]
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.history.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Forget all history, keeping the system prompt
    #[inline]
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Drop history entries past `len`
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.history.truncate(len);
    }

    /// Messages to submit: system message first, then history
    #[inline]
    pub fn request_messages(&self) -> Vec<Message> {
        self.system
            .iter()
            .chain(self.history.iter())
            .cloned()
            .collect()
    }
}

/// Per-session chat state, owned by whoever drives the conversation
#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    pub conversation: Conversation,
    /// Whether turns should be augmented from the knowledge base
    pub knowledge_base_ready: bool,
}

impl ChatSession {
    #[inline]
    pub fn new(knowledge_base_ready: bool) -> Self {
        Self {
            conversation: Conversation::new(),
            knowledge_base_ready,
        }
    }
}
