use serde::Serialize;
use std::fmt;

/// Which peer drives nomination.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IceRole {
    #[serde(rename = "controlling")]
    Controlling,
    #[serde(rename = "controlled")]
    Controlled,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl fmt::Display for IceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceRole::Controlling => "controlling",
            IceRole::Controlled => "controlled",
            IceRole::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Full or lite ICE implementation on the remote side (RFC 8445 2.5).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum IceMode {
    #[default]
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "lite")]
    Lite,
}

impl fmt::Display for IceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            IceMode::Full => "full",
            IceMode::Lite => "lite",
        };
        write!(f, "{s}")
    }
}

/// One generation of ICE credentials.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct IceParameters {
    pub ufrag: String,
    pub pwd: String,
}

impl IceParameters {
    pub fn new(ufrag: &str, pwd: &str) -> Self {
        Self {
            ufrag: ufrag.to_owned(),
            pwd: pwd.to_owned(),
        }
    }
}
