//! Simulated robot controller

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

use super::commands::RobotCommand;

const DEFAULT_STARTUP_SPEED: u8 = 50;
const MAX_SPEED: i64 = 100;
const AMBIENT_TEMPERATURE: f32 = 25.0;
const HEAT_PER_SPEED_PERCENT: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RobotStatus {
    Running,
    Stopped,
    #[serde(rename = "Emergency_Stop")]
    EmergencyStop,
}

impl fmt::Display for RobotStatus {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "Running",
            Self::Stopped => "Stopped",
            Self::EmergencyStop => "Emergency_Stop",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Robot {
    pub id: u32,
    pub status: RobotStatus,
    /// Percent of rated speed, 0-100
    pub speed: u8,
    /// Degrees Celsius
    pub temperature: f32,
}

impl Robot {
    fn new(id: u32) -> Self {
        Self {
            id,
            status: RobotStatus::Stopped,
            speed: 0,
            temperature: AMBIENT_TEMPERATURE,
        }
    }

    fn set_speed(&mut self, speed: u8) {
        self.speed = speed;
        self.temperature = AMBIENT_TEMPERATURE + f32::from(speed) * HEAT_PER_SPEED_PERCENT;
    }
}

/// Result of executing a command; domain failures are reported, not raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub success: bool,
    pub message: String,
}

impl CommandOutcome {
    #[inline]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    #[inline]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

fn checked_speed(speed: i64) -> Option<u8> {
    if (0..=MAX_SPEED).contains(&speed) {
        u8::try_from(speed).ok()
    } else {
        None
    }
}

/// In-memory fleet of robots numbered from 1
#[derive(Debug, Clone)]
pub struct RobotFleet {
    robots: BTreeMap<u32, Robot>,
}

impl RobotFleet {
    #[inline]
    pub fn new(robot_count: u32) -> Self {
        Self {
            robots: (1..=robot_count).map(|id| (id, Robot::new(id))).collect(),
        }
    }

    #[inline]
    pub fn robot(&self, id: u32) -> Option<&Robot> {
        self.robots.get(&id)
    }

    #[inline]
    pub fn robots(&self) -> impl Iterator<Item = &Robot> {
        self.robots.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.robots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }

    #[inline]
    pub fn execute(&mut self, command: &RobotCommand) -> CommandOutcome {
        let id = command.robot_id();
        let Some(robot) = self.robots.get_mut(&id) else {
            warn!("Command {} targets unknown robot {}", command, id);
            return CommandOutcome::failure(format!("Robot {} does not exist", id));
        };

        let outcome = match *command {
            RobotCommand::StartupSystem { target_speed, .. } => {
                let speed = match target_speed {
                    None => Some(DEFAULT_STARTUP_SPEED),
                    Some(requested) => checked_speed(requested),
                };
                match speed {
                    Some(speed) => {
                        robot.status = RobotStatus::Running;
                        robot.set_speed(speed);
                        CommandOutcome::success(format!(
                            "Robot {} reset and started at {}% speed",
                            id, speed
                        ))
                    }
                    None => CommandOutcome::failure(format!(
                        "Speed must be between 0 and {}",
                        MAX_SPEED
                    )),
                }
            }
            RobotCommand::EmergencyStop { .. } => {
                robot.status = RobotStatus::EmergencyStop;
                robot.set_speed(0);
                CommandOutcome::success(format!("Robot {} emergency stopped", id))
            }
            RobotCommand::AdjustSpeed { speed, .. } => {
                if robot.status == RobotStatus::EmergencyStop {
                    CommandOutcome::failure(format!(
                        "Robot {} is in emergency stop; reset it first",
                        id
                    ))
                } else if let Some(speed) = checked_speed(speed) {
                    robot.status = if speed == 0 {
                        RobotStatus::Stopped
                    } else {
                        RobotStatus::Running
                    };
                    robot.set_speed(speed);
                    CommandOutcome::success(format!("Robot {} speed set to {}%", id, speed))
                } else {
                    CommandOutcome::failure(format!(
                        "Speed must be between 0 and {}",
                        MAX_SPEED
                    ))
                }
            }
            RobotCommand::ResetSystem { .. } => {
                robot.status = RobotStatus::Stopped;
                robot.set_speed(0);
                CommandOutcome::success(format!("Robot {} reset", id))
            }
        };

        info!(
            "Executed {}: success={} ({})",
            command, outcome.success, outcome.message
        );
        outcome
    }
}
