// Chat module
// Conversation state, the streamed chat client and turn orchestration


pub mod client;
pub mod conversation;
pub mod orchestrator;
pub mod prompts;

pub use client::{ChatBackend, ChatClient, ChatStream, Completion, TokenStream};
pub use conversation::{ChatSession, Conversation, FunctionCall, Message, Role, ToolCall};
pub use orchestrator::ChatOrchestrator;
pub use prompts::{MAINTENANCE_PERSONA, QuickAction, build_system_prompt};
