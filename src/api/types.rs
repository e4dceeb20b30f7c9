//! API request and response types

use crate::state_machine::event::Choice;
use crate::state_machine::ConvState;
use serde::{Deserialize, Serialize};

/// Free text typed by the user; slash commands and main-menu labels included
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

/// A menu selection, already in its typed form
#[derive(Debug, Deserialize)]
pub struct ChoiceRequest {
    pub choice: Choice,
}

/// Response with the user's current session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: i64,
    pub flow: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<&'static str>,
    pub state: ConvState,
}

impl SessionResponse {
    pub fn new(user_id: i64, state: ConvState) -> Self {
        Self {
            user_id,
            flow: state.flow_name(),
            step: state.step_name(),
            state,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
