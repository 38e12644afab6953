use bytes::BytesMut;
use std::fmt;

use crate::candidate::Candidate;
use crate::connection::ConnectionId;
use crate::port::{Port, PortId};

/// STUN error code sent when a request is malformed (missing PRIORITY, no USERNAME).
pub const STUN_ERROR_BAD_REQUEST: u16 = 400;
/// STUN error code sent when the USERNAME does not match our credentials.
pub const STUN_ERROR_UNAUTHORIZED: u16 = 401;
pub const STUN_ERROR_UNKNOWN_ATTRIBUTE: u16 = 420;
pub const STUN_ERROR_STALE_CREDENTIALS: u16 = 438;
/// RFC 8445 7.3.1.1 role conflict.
pub const STUN_ERROR_ROLE_CONFLICT: u16 = 487;
pub const STUN_ERROR_SERVER_ERROR: u16 = 500;

pub(crate) fn stun_error_reason(code: u16) -> &'static str {
    match code {
        STUN_ERROR_BAD_REQUEST => "Bad Request",
        STUN_ERROR_UNAUTHORIZED => "Unauthorized",
        STUN_ERROR_UNKNOWN_ATTRIBUTE => "Unknown Attribute",
        STUN_ERROR_STALE_CREDENTIALS => "Stale Credentials",
        STUN_ERROR_ROLE_CONFLICT => "Role Conflict",
        STUN_ERROR_SERVER_ERROR => "Server Error",
        _ => "Unknown Error",
    }
}

/// 96-bit STUN transaction id.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub [u8; 12]);

impl TransactionId {
    pub fn new() -> Self {
        Self(rand::random::<[u8; 12]>())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// ICE-CONTROLLING / ICE-CONTROLLED attribute with its tiebreaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IceControl {
    Controlling(u64),
    Controlled(u64),
}

/// The ICE-relevant content of a STUN binding request, already
/// authenticated by the port layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRequest {
    pub transaction_id: TransactionId,
    /// `receiver_ufrag:sender_ufrag`
    pub username: String,
    pub priority: Option<u32>,
    pub use_candidate: bool,
    pub control: Option<IceControl>,
}

impl BindingRequest {
    /// Splits USERNAME into (local ufrag, remote ufrag) from the receiver's view.
    pub fn ufrags(&self) -> Option<(&str, &str)> {
        self.username.split_once(':')
    }
}

/// Decoded inbound traffic on a 5-tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    BindingRequest(BindingRequest),
    BindingSuccess {
        transaction_id: TransactionId,
    },
    BindingError {
        transaction_id: TransactionId,
        code: u16,
    },
    Data(BytesMut),
}

/// Work for the port layer, addressed by the transport context of the message
/// that carries it.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a connectivity check; integrity is keyed with `password`.
    Ping {
        connection: ConnectionId,
        request: BindingRequest,
        password: String,
    },
    BindingSuccess {
        transaction_id: TransactionId,
    },
    BindingError {
        transaction_id: TransactionId,
        code: u16,
        reason: String,
    },
    Data {
        connection: ConnectionId,
        packet_id: u64,
        payload: BytesMut,
    },
    /// Release any socket state behind the connection.
    Destroy(ConnectionId),
}

/// Application data to send on the selected connection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPacket {
    pub packet_id: u64,
    pub payload: BytesMut,
}

/// Lifecycle notifications from the gathering layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    PortReady(Port),
    CandidateReady {
        port: PortId,
        candidate: Candidate,
    },
    PortComplete(PortId),
    PortDestroyed(PortId),
    ConnectionDestroyed(ConnectionId),
    /// A TCP connection lost or regained its socket.
    ConnectionStateChanged {
        connection: ConnectionId,
        connected: bool,
    },
    ReadyToSend(ConnectionId),
}
