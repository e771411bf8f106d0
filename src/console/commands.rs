//! Closed set of robot commands the model may invoke

use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Invalid arguments for {command}: {message}")]
    InvalidArguments { command: String, message: String },

    #[error("No command found in model output")]
    NoCommandFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct RobotArgs {
    robot_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct StartupArgs {
    robot_id: u32,
    #[serde(default)]
    target_speed: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
struct SpeedArgs {
    robot_id: u32,
    speed: i64,
}

/// A command for the robot controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotCommand {
    /// Reset and start a robot, optionally at a given speed
    StartupSystem {
        robot_id: u32,
        target_speed: Option<i64>,
    },
    EmergencyStop {
        robot_id: u32,
    },
    AdjustSpeed {
        robot_id: u32,
        speed: i64,
    },
    ResetSystem {
        robot_id: u32,
    },
}

fn parse_arguments(arguments: &str) -> Result<Value, serde_json::Error> {
    let trimmed = arguments.trim();
    if trimmed.is_empty() {
        return Ok(json!({}));
    }
    // Models sometimes answer with single-quoted pseudo JSON
    serde_json::from_str(trimmed).or_else(|e| {
        serde_json::from_str(&trimmed.replace('\'', "\"")).map_err(|_| e)
    })
}

impl RobotCommand {
    pub const NAMES: [&'static str; 4] = [
        "startup_system",
        "emergency_stop",
        "adjust_speed",
        "reset_system",
    ];

    /// Build a command from a tool call's function name and JSON arguments
    #[inline]
    pub fn from_call(name: &str, arguments: &str) -> Result<Self, ConsoleError> {
        let value = parse_arguments(arguments).map_err(|e| ConsoleError::InvalidArguments {
            command: name.to_string(),
            message: e.to_string(),
        })?;
        Self::from_value(name, value)
    }

    /// Build a command from a function name and an already parsed argument object
    #[inline]
    pub fn from_value(name: &str, arguments: Value) -> Result<Self, ConsoleError> {
        let invalid = |e: serde_json::Error| ConsoleError::InvalidArguments {
            command: name.to_string(),
            message: e.to_string(),
        };

        match name {
            "startup_system" => {
                let args: StartupArgs = serde_json::from_value(arguments).map_err(invalid)?;
                Ok(Self::StartupSystem {
                    robot_id: args.robot_id,
                    target_speed: args.target_speed,
                })
            }
            "emergency_stop" => {
                let args: RobotArgs = serde_json::from_value(arguments).map_err(invalid)?;
                Ok(Self::EmergencyStop {
                    robot_id: args.robot_id,
                })
            }
            "adjust_speed" => {
                let args: SpeedArgs = serde_json::from_value(arguments).map_err(invalid)?;
                Ok(Self::AdjustSpeed {
                    robot_id: args.robot_id,
                    speed: args.speed,
                })
            }
            "reset_system" => {
                let args: RobotArgs = serde_json::from_value(arguments).map_err(invalid)?;
                Ok(Self::ResetSystem {
                    robot_id: args.robot_id,
                })
            }
            other => Err(ConsoleError::UnknownCommand(other.to_string())),
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartupSystem { .. } => "startup_system",
            Self::EmergencyStop { .. } => "emergency_stop",
            Self::AdjustSpeed { .. } => "adjust_speed",
            Self::ResetSystem { .. } => "reset_system",
        }
    }

    #[inline]
    pub fn robot_id(&self) -> u32 {
        match *self {
            Self::StartupSystem { robot_id, .. }
            | Self::EmergencyStop { robot_id }
            | Self::AdjustSpeed { robot_id, .. }
            | Self::ResetSystem { robot_id } => robot_id,
        }
    }
}

impl fmt::Display for RobotCommand {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartupSystem {
                robot_id,
                target_speed: Some(speed),
            } => write!(f, "{}(robot {}, speed {})", self.name(), robot_id, speed),
            Self::AdjustSpeed { robot_id, speed } => {
                write!(f, "{}(robot {}, speed {})", self.name(), robot_id, speed)
            }
            _ => write!(f, "{}(robot {})", self.name(), self.robot_id()),
        }
    }
}

/// Parse a `{"name": .., "arguments": {..}}` command written into plain text.
///
/// Takes the span from the first `{` to the last `}`.
#[inline]
pub fn extract_inline_command(text: &str) -> Result<RobotCommand, ConsoleError> {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Err(ConsoleError::NoCommandFound);
    };
    let Some(candidate) = text.get(start..=end) else {
        return Err(ConsoleError::NoCommandFound);
    };

    let value = parse_arguments(candidate).map_err(|_| ConsoleError::NoCommandFound)?;
    let Some(name) = value.get("name").and_then(Value::as_str) else {
        return Err(ConsoleError::NoCommandFound);
    };

    let arguments = match value.get("arguments") {
        None | Some(Value::Null) => json!({}),
        Some(Value::String(encoded)) => {
            parse_arguments(encoded).map_err(|e| ConsoleError::InvalidArguments {
                command: name.to_string(),
                message: e.to_string(),
            })?
        }
        Some(other) => other.clone(),
    };

    RobotCommand::from_value(name, arguments)
}

/// Function-calling schema advertised to the model
#[inline]
pub fn tool_definitions() -> Value {
    json!([
        {
            "type": "function",
            "function": {
                "name": "startup_system",
                "description": "Start a robot in one step (automatic reset, then set speed).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "robot_id": {"type": "integer"},
                        "target_speed": {"type": "integer"}
                    },
                    "required": ["robot_id"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "emergency_stop",
                "description": "Emergency stop a robot.",
                "parameters": {
                    "type": "object",
                    "properties": {"robot_id": {"type": "integer"}},
                    "required": ["robot_id"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "adjust_speed",
                "description": "Adjust a robot's speed (0-100).",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "robot_id": {"type": "integer"},
                        "speed": {"type": "integer"}
                    },
                    "required": ["robot_id", "speed"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "reset_system",
                "description": "Reset a robot's control system.",
                "parameters": {
                    "type": "object",
                    "properties": {"robot_id": {"type": "integer"}},
                    "required": ["robot_id"]
                }
            }
        }
    ])
}
