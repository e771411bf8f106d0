use super::*;
use crate::chat::{Completion, FunctionCall, Role, TokenStream};
use anyhow::anyhow;
use std::cell::RefCell;
use std::collections::VecDeque;

/// Backend that answers `complete` from a queue
struct CannedBackend {
    replies: RefCell<VecDeque<anyhow::Result<Completion>>>,
    seen_tools: RefCell<bool>,
}

impl CannedBackend {
    fn new(replies: Vec<anyhow::Result<Completion>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            seen_tools: RefCell::new(false),
        }
    }
}

impl ChatBackend for CannedBackend {
    fn stream_chat(&self, _messages: &[Message]) -> anyhow::Result<TokenStream> {
        Err(anyhow!("console never streams"))
    }

    fn complete(
        &self,
        messages: &[Message],
        tools: Option<&serde_json::Value>,
    ) -> anyhow::Result<Completion> {
        assert_eq!(messages[0].role, Role::System);
        *self.seen_tools.borrow_mut() = tools.is_some();
        self.replies
            .borrow_mut()
            .pop_front()
            .expect("test scripted too few replies")
    }
}

fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        kind: "function".to_string(),
        function: FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

fn text_reply(content: &str) -> anyhow::Result<Completion> {
    Ok(Completion {
        content: content.to_string(),
        tool_calls: Vec::new(),
    })
}

#[test]
fn console_config_default() {
    assert_eq!(ConsoleConfig::default().robot_count, 5);
}

#[test]
fn parses_every_known_command() {
    assert_eq!(
        RobotCommand::from_call("startup_system", r#"{"robot_id": 1, "target_speed": 80}"#),
        Ok(RobotCommand::StartupSystem {
            robot_id: 1,
            target_speed: Some(80)
        })
    );
    assert_eq!(
        RobotCommand::from_call("startup_system", r#"{"robot_id": 2}"#),
        Ok(RobotCommand::StartupSystem {
            robot_id: 2,
            target_speed: None
        })
    );
    assert_eq!(
        RobotCommand::from_call("emergency_stop", r#"{"robot_id": 3}"#),
        Ok(RobotCommand::EmergencyStop { robot_id: 3 })
    );
    assert_eq!(
        RobotCommand::from_call("adjust_speed", r#"{"robot_id": 4, "speed": 30}"#),
        Ok(RobotCommand::AdjustSpeed {
            robot_id: 4,
            speed: 30
        })
    );
    assert_eq!(
        RobotCommand::from_call("reset_system", r#"{'robot_id': 5}"#),
        Ok(RobotCommand::ResetSystem { robot_id: 5 })
    );
}

#[test]
fn unknown_command_is_rejected() {
    assert_eq!(
        RobotCommand::from_call("self_destruct", r#"{"robot_id": 1}"#),
        Err(ConsoleError::UnknownCommand("self_destruct".to_string()))
    );
}

#[test]
fn bad_arguments_are_rejected() {
    let missing = RobotCommand::from_call("adjust_speed", r#"{"robot_id": 1}"#);
    assert!(matches!(missing, Err(ConsoleError::InvalidArguments { .. })));

    let garbage = RobotCommand::from_call("emergency_stop", "robot one");
    assert!(matches!(garbage, Err(ConsoleError::InvalidArguments { .. })));
}

#[test]
fn inline_command_is_extracted_from_text() {
    let text = r#"Sure: {"name": "adjust_speed", "arguments": {"robot_id": 2, "speed": 60}} done"#;
    assert_eq!(
        extract_inline_command(text),
        Ok(RobotCommand::AdjustSpeed {
            robot_id: 2,
            speed: 60
        })
    );

    let encoded = r#"{"name": "emergency_stop", "arguments": "{\"robot_id\": 1}"}"#;
    assert_eq!(
        extract_inline_command(encoded),
        Ok(RobotCommand::EmergencyStop { robot_id: 1 })
    );
}

#[test]
fn inline_extraction_without_command() {
    assert_eq!(
        extract_inline_command("All robots nominal."),
        Err(ConsoleError::NoCommandFound)
    );
    assert_eq!(
        extract_inline_command("} backwards {"),
        Err(ConsoleError::NoCommandFound)
    );
    assert_eq!(
        extract_inline_command(r#"{"robot_id": 1}"#),
        Err(ConsoleError::NoCommandFound)
    );
}

#[test]
fn tool_definitions_cover_every_command() {
    let tools = tool_definitions();
    let names: Vec<&str> = tools
        .as_array()
        .expect("tools should be an array")
        .iter()
        .filter_map(|t| t["function"]["name"].as_str())
        .collect();
    assert_eq!(names, RobotCommand::NAMES);
}

#[test]
fn fleet_startup_and_speed() {
    let mut fleet = RobotFleet::new(3);
    assert_eq!(fleet.len(), 3);

    let outcome = fleet.execute(&RobotCommand::StartupSystem {
        robot_id: 1,
        target_speed: Some(80),
    });
    assert!(outcome.success);
    let robot = fleet.robot(1).expect("robot 1 exists");
    assert_eq!(robot.status, RobotStatus::Running);
    assert_eq!(robot.speed, 80);
    assert!(robot.temperature > 60.0);

    let outcome = fleet.execute(&RobotCommand::AdjustSpeed {
        robot_id: 1,
        speed: 0,
    });
    assert!(outcome.success);
    assert_eq!(fleet.robot(1).expect("robot 1 exists").status, RobotStatus::Stopped);
}

#[test]
fn fleet_reports_domain_failures() {
    let mut fleet = RobotFleet::new(2);

    assert!(!fleet.execute(&RobotCommand::EmergencyStop { robot_id: 9 }).success);
    assert!(
        !fleet
            .execute(&RobotCommand::AdjustSpeed {
                robot_id: 1,
                speed: 150
            })
            .success
    );

    fleet.execute(&RobotCommand::EmergencyStop { robot_id: 2 });
    let blocked = fleet.execute(&RobotCommand::AdjustSpeed {
        robot_id: 2,
        speed: 20,
    });
    assert!(!blocked.success);
    assert!(blocked.message.contains("reset"));

    fleet.execute(&RobotCommand::ResetSystem { robot_id: 2 });
    let robot = fleet.robot(2).expect("robot 2 exists");
    assert_eq!(robot.status, RobotStatus::Stopped);
    assert_eq!(robot.speed, 0);
}

#[test]
fn handle_executes_tool_calls() {
    let backend = CannedBackend::new(vec![Ok(Completion {
        content: String::new(),
        tool_calls: vec![
            tool_call("call_1", "startup_system", r#"{"robot_id": 1, "target_speed": 70}"#),
            tool_call("call_2", "emergency_stop", r#"{"robot_id": 2}"#),
        ],
    })]);
    let mut console = CommandConsole::new(&ConsoleConfig::default());

    let reply = console
        .handle(&backend, "start robot 1 at 70 and stop robot 2")
        .expect("handle should succeed");

    assert!(reply.executed);
    assert!(*backend.seen_tools.borrow());
    assert_eq!(reply.outcomes.len(), 2);
    assert!(reply.outcomes.iter().all(|o| o.success));
    assert_eq!(console.fleet().robot(1).expect("robot 1").speed, 70);
    assert_eq!(
        console.fleet().robot(2).expect("robot 2").status,
        RobotStatus::EmergencyStop
    );

    let roles: Vec<Role> = console.conversation().history().iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
    );
    let tool_message = &console.conversation().history()[2];
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
}

#[test]
fn handle_reports_unknown_tool_call() {
    let backend = CannedBackend::new(vec![Ok(Completion {
        content: String::new(),
        tool_calls: vec![tool_call("call_1", "open_valve", "{}")],
    })]);
    let mut console = CommandConsole::new(&ConsoleConfig::default());

    let reply = console.handle(&backend, "open the valve").expect("handle should succeed");
    assert!(reply.executed);
    assert!(!reply.outcomes[0].success);
    assert!(reply.text.contains("Unknown command: open_valve"));
}

#[test]
fn handle_falls_back_to_inline_json() {
    let backend = CannedBackend::new(vec![text_reply(
        r#"{"name": "adjust_speed", "arguments": {"robot_id": 3, "speed": 45}}"#,
    )]);
    let mut console = CommandConsole::new(&ConsoleConfig::default());

    let reply = console.handle(&backend, "robot 3 to 45").expect("handle should succeed");
    assert!(reply.executed);
    assert_eq!(console.fleet().robot(3).expect("robot 3").speed, 45);
}

#[test]
fn handle_passes_plain_text_through() {
    let backend = CannedBackend::new(vec![text_reply("Which robot do you mean?")]);
    let mut console = CommandConsole::new(&ConsoleConfig::default());

    let reply = console.handle(&backend, "speed up").expect("handle should succeed");
    assert!(!reply.executed);
    assert_eq!(reply.text, "Which robot do you mean?");
    assert_eq!(console.conversation().len(), 2);
}

#[test]
fn provider_failure_leaves_conversation_unchanged() {
    let backend = CannedBackend::new(vec![Err(anyhow!("HTTP 500"))]);
    let mut console = CommandConsole::new(&ConsoleConfig::default());

    let err = console
        .handle(&backend, "stop robot 1")
        .expect_err("provider failure should surface");
    assert!(matches!(err, AssistError::Console(_)));
    assert!(console.conversation().is_empty());
}
