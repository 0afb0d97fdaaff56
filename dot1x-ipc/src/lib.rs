use dot1x_core::{Profile, StatusReport, UserAnswers};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Command {
    /// Replace the active profile and restart the exchange.
    Run { profile: Profile },
    Retry,
    TakeUserInput { answers: UserAnswers },
    Stop,
    Status,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Response {
    Status(StatusReport),
    Success,
    Error(String),
}
