// Console module
// Natural-language robot command console backed by model tool calls

#[cfg(test)]
mod tests;

pub mod commands;
pub mod fleet;

pub use commands::{ConsoleError, RobotCommand, extract_inline_command, tool_definitions};
pub use fleet::{CommandOutcome, Robot, RobotFleet, RobotStatus};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chat::{ChatBackend, Conversation, Message, ToolCall};
use crate::{AssistError, Result};

/// System prompt that turns the model into a command translator
pub const CONTROL_PROMPT: &str = "You are an industrial control program.
1. Always prefer function calling (tool calls).
2. If you cannot call a tool, output the command directly as JSON, for example:
   {\"name\": \"startup_system\", \"arguments\": {\"robot_id\": 1, \"target_speed\": 80}}
3. No small talk and no Markdown; output only JSON.";

const EXECUTED_ACK: &str = "✅ Operation complete.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Number of simulated robots, numbered from 1
    pub robot_count: u32,
}

impl Default for ConsoleConfig {
    #[inline]
    fn default() -> Self {
        Self { robot_count: 5 }
    }
}

/// What the console did with one operator instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleReply {
    /// Whether at least one command reached the fleet
    pub executed: bool,
    /// Text to show the operator
    pub text: String,
    /// One entry per command that reached the fleet, in execution order
    pub outcomes: Vec<CommandOutcome>,
}

/// Command conversation plus the fleet it controls
pub struct CommandConsole {
    conversation: Conversation,
    fleet: RobotFleet,
    tools: serde_json::Value,
}

impl CommandConsole {
    #[inline]
    pub fn new(config: &ConsoleConfig) -> Self {
        Self {
            conversation: Conversation::with_system_prompt(CONTROL_PROMPT),
            fleet: RobotFleet::new(config.robot_count),
            tools: tool_definitions(),
        }
    }

    #[inline]
    pub fn fleet(&self) -> &RobotFleet {
        &self.fleet
    }

    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn run_tool_call(&mut self, call: &ToolCall) -> CommandOutcome {
        let outcome = match RobotCommand::from_call(&call.function.name, &call.function.arguments)
        {
            Ok(command) => self.fleet.execute(&command),
            Err(e) => {
                warn!("Rejected tool call {}: {}", call.function.name, e);
                CommandOutcome::failure(e.to_string())
            }
        };

        let content = serde_json::to_string(&outcome).unwrap_or_else(|_| outcome.message.clone());
        self.conversation
            .push(Message::tool(call.id.clone(), call.function.name.clone(), content));
        outcome
    }

    /// Translate an operator instruction into commands and execute them.
    ///
    /// Tool calls are preferred; a JSON command written into the reply text
    /// is used as a fallback. A provider failure leaves the conversation as
    /// it was.
    #[inline]
    pub fn handle<B: ChatBackend>(&mut self, backend: &B, prompt: &str) -> Result<ConsoleReply> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AssistError::Console("Instruction is empty".to_string()));
        }

        let checkpoint = self.conversation.len();
        self.conversation.push(Message::user(prompt));

        let messages = self.conversation.request_messages();
        let completion = match backend.complete(&messages, Some(&self.tools)) {
            Ok(completion) => completion,
            Err(e) => {
                self.conversation.truncate(checkpoint);
                return Err(AssistError::Console(format!("{:#}", e)));
            }
        };

        if !completion.tool_calls.is_empty() {
            debug!("Model requested {} tool calls", completion.tool_calls.len());
            self.conversation.push(Message::assistant_tool_calls(
                completion.content.clone(),
                completion.tool_calls.clone(),
            ));
            let outcomes: Vec<CommandOutcome> = completion
                .tool_calls
                .iter()
                .map(|call| self.run_tool_call(call))
                .collect();
            return Ok(self.acknowledge(outcomes));
        }

        match extract_inline_command(&completion.content) {
            Ok(command) => {
                debug!("Using inline command from reply text: {}", command);
                self.conversation
                    .push(Message::assistant(completion.content.clone()));
                let outcome = self.fleet.execute(&command);
                Ok(self.acknowledge(vec![outcome]))
            }
            Err(ConsoleError::NoCommandFound) => {
                self.conversation
                    .push(Message::assistant(completion.content.clone()));
                Ok(ConsoleReply {
                    executed: false,
                    text: completion.content,
                    outcomes: Vec::new(),
                })
            }
            Err(e) => {
                warn!("Inline command rejected: {}", e);
                self.conversation
                    .push(Message::assistant(completion.content.clone()));
                Ok(ConsoleReply {
                    executed: false,
                    text: format!("⚠️ {}", e),
                    outcomes: Vec::new(),
                })
            }
        }
    }

    fn acknowledge(&mut self, outcomes: Vec<CommandOutcome>) -> ConsoleReply {
        self.conversation.push(Message::assistant(EXECUTED_ACK));
        let text = outcomes
            .iter()
            .map(|o| {
                let mark = if o.success { "✅" } else { "❌" };
                format!("{} {}", mark, o.message)
            })
            .join("\n");
        ConsoleReply {
            executed: true,
            text,
            outcomes,
        }
    }

    /// Forget the command conversation; robot state is kept
    #[inline]
    pub fn clear(&mut self) {
        self.conversation.clear();
    }
}
