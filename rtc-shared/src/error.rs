#![allow(dead_code)]

use std::net;
use std::num::ParseIntError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Indicates local username fragment insufficient bits are provided.
    /// Have to be at least 24 bits long.
    #[error("local username fragment is less than 24 bits long")]
    ErrLocalUfragInsufficientBits,

    /// Indicates local passoword insufficient bits are provided.
    /// Have to be at least 128 bits long.
    #[error("local password is less than 128 bits long")]
    ErrLocalPwdInsufficientBits,

    /// Indicates remote credentials were set with an empty ufrag.
    #[error("remote ufrag is empty")]
    ErrRemoteUfragEmpty,

    /// Indicates remote credentials were set with an empty pwd.
    #[error("remote pwd is empty")]
    ErrRemotePwdEmpty,

    /// Indicates a packet was written before any connection was selected.
    #[error("no best connection available")]
    ErrNoBestConnection,

    /// Indicates the selected connection cannot carry data yet.
    #[error("best connection is not writable")]
    ErrConnectionNotWritable,

    /// Indicates the channel was used after close.
    #[error("channel is closed")]
    ErrChannelClosed,

    /// Indicates a collaborator referenced a connection that no longer exists.
    #[error("unknown connection")]
    ErrUnknownConnection,

    /// Indicates a collaborator referenced a port that was never announced.
    #[error("unknown port")]
    ErrUnknownPort,

    /// Indicates a port was announced twice.
    #[error("port already exists")]
    ErrPortAlreadyExists,

    #[error("username mismatch")]
    ErrMismatchUsername,
    #[error("binding request without PRIORITY attribute")]
    ErrMissingPriority,
    #[error("unhandled STUN packet")]
    ErrUnhandledStunPacket,

    /// Indicates an unsupported transport type was provided.
    #[error("invalid transport protocol type")]
    ErrProtoType,

    /// Indicates we were unable to parse a candidate address.
    #[error("failed to parse address")]
    ErrAddressParseFailed,

    #[error("attribute not long enough to be ICE candidate")]
    ErrAttributeTooShortIceCandidate,
    #[error("could not parse related addresses")]
    ErrParseRelatedAddr,
    #[error("could not parse type")]
    ErrParseType,
    #[error("unknown candidate type")]
    ErrUnknownCandidateType,

    //Third Party Error
    #[error("parse ip: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("{0}")]
    Other(String),
}
