//! # rtc-ice
//!
//! A sans-I/O ICE connectivity-check engine.
//!
//! [`Channel`] owns the candidate pairs of one ICE component and decides
//! which pair to ping, which pair to send on and which pairs to prune. It
//! implements [`sansio::Protocol`]; socket handling, STUN encoding and
//! candidate gathering stay with the caller, who feeds the channel decoded
//! traffic and port lifecycle events and executes the [`Command`]s it emits.

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod candidate;
pub mod channel;
pub mod connection;
pub mod message;
pub mod network;
pub mod port;
pub mod rand;
pub mod role;
pub mod state;
pub(crate) mod task;

pub use channel::channel_config::{ChannelConfig, IceConfig};
pub use channel::channel_stats::ConnectionInfo;
pub use channel::{Channel, Event};
pub use connection::{CandidatePairState, Connection, ConnectionId, WriteState};
pub use message::{
    BindingRequest, Command, IceControl, InboundMessage, OutboundPacket, TransactionId,
    TransportEvent,
};
pub use network::{AdapterType, DefaultNetworkCost, Network, NetworkCost, NetworkId};
pub use port::{Port, PortId};
pub use role::{IceMode, IceParameters, IceRole};
pub use state::IceTransportState;
