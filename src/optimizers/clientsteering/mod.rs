//! Client steering algorithms and their shared back-off state.

mod band;
mod state;

pub use band::*;
pub use state::*;

use std::fmt;

use serde::{Deserialize, Serialize};

/// A steering action for one (AP, client) pair.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientAction {
    /// Disconnect the client outright
    Deauthenticate,
    /// Ask the client to move to 5G/6G
    SteerUp,
    /// Ask the client to move to 2G
    SteerDown,
}

impl ClientAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAction::Deauthenticate => "DEAUTHENTICATE",
            ClientAction::SteerUp => "STEER_UP",
            ClientAction::SteerDown => "STEER_DOWN",
        }
    }
}

impl fmt::Display for ClientAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
