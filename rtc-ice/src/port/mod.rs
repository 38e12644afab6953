#[cfg(test)]
mod port_test;

use shared::TransportProtocol;
use std::fmt;
use std::net::SocketAddr;

use crate::candidate::{Candidate, CandidateType, TcpType};
use crate::network::Network;

/// Handle of a port owned by the gathering layer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Where a remote candidate was learned from, relative to the port asked
/// to pair with it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CandidateOrigin {
    /// From a binding request received on this very port.
    ThisPort,
    /// From a binding request received on another port.
    OtherPort,
    /// From signaling.
    Message,
}

/// A local socket (host, STUN or TURN allocation) and the candidates gathered on it.
#[derive(Debug, Clone)]
pub struct Port {
    pub(crate) id: PortId,
    pub(crate) network: Network,
    pub(crate) protocol: TransportProtocol,
    pub(crate) generation: u32,
    pub(crate) candidates: Vec<Candidate>,
    pub(crate) complete: bool,
}

impl Port {
    pub fn new(id: PortId, network: Network, protocol: TransportProtocol) -> Self {
        Self {
            id,
            network,
            protocol,
            generation: 0,
            candidates: vec![],
            complete: false,
        }
    }

    /// Sets the gathering generation, bumped by the gathering layer on ICE restart.
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_candidate(mut self, candidate: Candidate) -> Self {
        self.candidates.push(candidate);
        self
    }

    pub fn id(&self) -> PortId {
        self.id
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether one of this port's candidates owns `local_addr`.
    pub(crate) fn has_address(&self, local_addr: SocketAddr, protocol: TransportProtocol) -> bool {
        self.protocol == protocol && self.candidates.iter().any(|c| c.address == local_addr)
    }

    /// Picks the local candidate a connection toward `remote` would use, or
    /// `None` if this port cannot reach it.
    pub(crate) fn local_candidate_for(
        &self,
        remote: &Candidate,
        origin: CandidateOrigin,
    ) -> Option<&Candidate> {
        if remote.protocol != self.protocol {
            return None;
        }

        if self.protocol == TransportProtocol::TCP {
            // An active-only remote never listens, so there is nothing to connect to.
            if remote.tcp_type == TcpType::Active
                || (remote.tcp_type == TcpType::Unspecified && remote.address.port() == 0)
            {
                return None;
            }
            // We can't accept TCP connections incoming on other ports.
            if origin == CandidateOrigin::OtherPort {
                return None;
            }
        }

        let same_family = |c: &&Candidate| c.address.is_ipv4() == remote.address.is_ipv4();
        if self
            .candidates
            .iter()
            .any(|c| c.candidate_type == CandidateType::Relay)
        {
            self.candidates
                .iter()
                .filter(|c| c.candidate_type == CandidateType::Relay)
                .find(same_family)
        } else {
            self.candidates.iter().find(same_family)
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Port[{}:{}:{}:{}]",
            self.id,
            self.network.name(),
            self.protocol,
            self.generation
        )
    }
}
