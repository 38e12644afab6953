#[cfg(test)]
mod state_test;

use serde::Serialize;
use std::fmt;

/// Aggregate state of one ICE transport channel.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IceTransportState {
    /// No connection has existed yet.
    #[default]
    #[serde(rename = "init")]
    Init,
    /// Some network still has more than one live candidate pair.
    #[serde(rename = "connecting")]
    Connecting,
    /// Every network has settled on at most one live candidate pair.
    #[serde(rename = "completed")]
    Completed,
    /// No live candidate pair remains.
    #[serde(rename = "failed")]
    Failed,
}

impl fmt::Display for IceTransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceTransportState::Init => "Init",
            IceTransportState::Connecting => "Connecting",
            IceTransportState::Completed => "Completed",
            IceTransportState::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

impl IceTransportState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: IceTransportState) -> bool {
        use IceTransportState::*;
        match self {
            Init => matches!(next, Connecting | Completed),
            Connecting => matches!(next, Completed | Failed),
            Completed => matches!(next, Connecting | Failed),
            Failed => matches!(next, Connecting | Completed),
        }
    }
}
