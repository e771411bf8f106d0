//! Prompt text for the maintenance assistant

use clap::ValueEnum;

/// Fixed persona and answering rules for the maintenance assistant
pub const MAINTENANCE_PERSONA: &str = "You are an industrial maintenance expert.
Answer the user's question based on the [Reference material] below. If the material does not contain the answer, supplement it with your professional knowledge, but state \"not mentioned in the reference material\".";

const REFERENCE_HEADING: &str = "[Reference material]:";

/// System prompt for one turn, with retrieved context appended when present
#[inline]
pub fn build_system_prompt(context: &str) -> String {
    if context.trim().is_empty() {
        MAINTENANCE_PERSONA.to_string()
    } else {
        format!("{}\n\n{}\n{}", MAINTENANCE_PERSONA, REFERENCE_HEADING, context)
    }
}

/// Canned diagnostic questions for common line faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QuickAction {
    /// Servo motor fault
    Servo,
    /// PLC communication timeout
    PlcTimeout,
    /// ABB robot error codes
    AbbErrors,
    /// Encoder fault
    Encoder,
}

impl QuickAction {
    pub const ALL: [Self; 4] = [Self::Servo, Self::PlcTimeout, Self::AbbErrors, Self::Encoder];

    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            Self::Servo => "Servo motor fault",
            Self::PlcTimeout => "PLC communication timeout",
            Self::AbbErrors => "ABB robot error",
            Self::Encoder => "Encoder fault",
        }
    }

    #[inline]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::Servo => {
                "My equipment has a [servo motor fault]. List the troubleshooting steps in detail under three headings: hardware checks, electrical checks and parameter settings."
            }
            Self::PlcTimeout => {
                "My equipment has a [PLC communication timeout]. List the troubleshooting steps in detail under three headings: physical connections, network configuration and interference."
            }
            Self::AbbErrors => {
                "My ABB robot is reporting errors. List the 5 most common error codes with their meaning and how to resolve them."
            }
            Self::Encoder => {
                "My equipment reports an [encoder fault]. List the troubleshooting steps (wiring, battery, mechanical mounting)."
            }
        }
    }
}
