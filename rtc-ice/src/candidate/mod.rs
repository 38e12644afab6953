
pub mod candidate_host;
pub mod candidate_peer_reflexive;
pub mod candidate_relay;
pub mod candidate_server_reflexive;

use crc::{CRC_32_ISCSI, Crc};
use serde::Serialize;
use shared::TransportProtocol;
use shared::error::*;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::candidate::candidate_host::CandidateHostConfig;
use crate::candidate::candidate_peer_reflexive::CandidatePeerReflexiveConfig;
use crate::candidate::candidate_relay::CandidateRelayConfig;
use crate::candidate::candidate_server_reflexive::CandidateServerReflexiveConfig;
use crate::rand::generate_cand_id;

pub(crate) const DEFAULT_LOCAL_PREFERENCE: u16 = 65535;

/// Indicates that the candidate is used for RTP.
pub const COMPONENT_RTP: u16 = 1;
/// Indicates that the candidate is used for RTCP.
pub const COMPONENT_RTCP: u16 = 2;

/// Represents the type of candidate `CandidateType` enum.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum CandidateType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "srflx")]
    ServerReflexive,
    #[serde(rename = "prflx")]
    PeerReflexive,
    #[serde(rename = "relay")]
    Relay,
}

// String makes CandidateType printable
impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relay => "relay",
            CandidateType::Unspecified => "Unknown candidate type",
        };
        write!(f, "{s}")
    }
}

impl CandidateType {
    /// Returns the preference weight of a `CandidateType`.
    ///
    /// 4.1.2.2.  Guidelines for Choosing Type and Local Preferences
    /// The RECOMMENDED values are 126 for host candidates, 100
    /// for server reflexive candidates, 110 for peer reflexive candidates,
    /// and 0 for relayed candidates.
    #[must_use]
    pub const fn preference(self) -> u16 {
        match self {
            Self::Host => 126,
            Self::PeerReflexive => 110,
            Self::ServerReflexive => 100,
            Self::Relay | CandidateType::Unspecified => 0,
        }
    }
}

/// Direction of a TCP candidate (RFC 6544).
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TcpType {
    #[default]
    #[serde(rename = "unspecified")]
    Unspecified,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "passive")]
    Passive,
    #[serde(rename = "so")]
    SimultaneousOpen,
}

impl From<&str> for TcpType {
    fn from(raw: &str) -> Self {
        match raw {
            "active" => Self::Active,
            "passive" => Self::Passive,
            "so" => Self::SimultaneousOpen,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for TcpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Active => "active",
            Self::Passive => "passive",
            Self::SimultaneousOpen => "so",
            Self::Unspecified => "unspecified",
        };
        write!(f, "{s}")
    }
}

/// Fields shared by every candidate constructor.
#[derive(Default)]
pub struct CandidateConfig {
    pub candidate_id: String,
    pub network: String,
    pub address: String,
    pub port: u16,
    pub component: u16,
    pub priority: u32,
    pub foundation: String,
    pub generation: u32,
    pub network_id: u16,
    pub network_cost: u16,
    pub ufrag: String,
    pub password: String,
}

impl CandidateConfig {
    pub(crate) fn into_candidate(
        self,
        candidate_type: CandidateType,
        related_address: Option<SocketAddr>,
    ) -> Result<Candidate> {
        let ip: IpAddr = match self.address.parse() {
            Ok(ip) => ip,
            Err(_) => return Err(Error::ErrAddressParseFailed),
        };
        let protocol = if self.network.is_empty() {
            TransportProtocol::UDP
        } else {
            self.network.parse()?
        };

        let id = if self.candidate_id.is_empty() {
            generate_cand_id()
        } else {
            self.candidate_id
        };

        Ok(Candidate {
            id,
            candidate_type,
            component: self.component,
            protocol,
            address: SocketAddr::new(ip, self.port),
            related_address,
            foundation_override: self.foundation,
            priority_override: self.priority,
            generation: self.generation,
            network_id: self.network_id,
            network_cost: self.network_cost,
            ufrag: self.ufrag,
            password: self.password,
            ..Candidate::default()
        })
    }
}

pub(crate) fn parse_related_address(rel_addr: &str, rel_port: u16) -> Result<Option<SocketAddr>> {
    if rel_addr.is_empty() {
        return Ok(None);
    }
    let ip: IpAddr = rel_addr.parse()?;
    Ok(Some(SocketAddr::new(ip, rel_port)))
}

/// One network path endpoint, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub(crate) id: String,
    pub(crate) candidate_type: CandidateType,
    pub(crate) component: u16,
    pub(crate) protocol: TransportProtocol,
    pub(crate) address: SocketAddr,
    pub(crate) related_address: Option<SocketAddr>,
    pub(crate) tcp_type: TcpType,
    pub(crate) relay_protocol: Option<TransportProtocol>,

    #[serde(skip)]
    pub(crate) foundation_override: String,
    #[serde(skip)]
    pub(crate) priority_override: u32,

    pub(crate) generation: u32,
    pub(crate) network_id: u16,
    pub(crate) network_cost: u16,
    pub(crate) ufrag: String,
    #[serde(skip)]
    pub(crate) password: String,
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            id: String::new(),
            candidate_type: CandidateType::default(),
            component: COMPONENT_RTP,
            protocol: TransportProtocol::UDP,
            address: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            related_address: None,
            tcp_type: TcpType::default(),
            relay_protocol: None,

            foundation_override: String::new(),
            priority_override: 0,

            generation: 0,
            network_id: 0,
            network_cost: 0,
            ufrag: String::new(),
            password: String::new(),
        }
    }
}

// String makes the candidate printable
impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} gen {}",
            self.protocol, self.candidate_type, self.address, self.generation,
        )?;
        if let Some(related_address) = self.related_address {
            write!(f, " related {related_address}")?;
        }
        Ok(())
    }
}

impl Candidate {
    pub fn foundation(&self) -> String {
        if !self.foundation_override.is_empty() {
            return self.foundation_override.clone();
        }

        let mut buf = vec![];
        buf.extend_from_slice(self.candidate_type().to_string().as_bytes());
        buf.extend_from_slice(self.address.ip().to_string().as_bytes());
        buf.extend_from_slice(self.protocol.to_string().as_bytes());

        let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(&buf);

        format!("{checksum}")
    }

    /// Returns Candidate ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns candidate component.
    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn protocol(&self) -> TransportProtocol {
        self.protocol
    }

    /// Returns the transport address of the candidate.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Returns candidate type.
    pub fn candidate_type(&self) -> CandidateType {
        self.candidate_type
    }

    pub fn related_address(&self) -> Option<SocketAddr> {
        self.related_address
    }

    pub fn tcp_type(&self) -> TcpType {
        self.tcp_type
    }

    /// Protocol between a relay candidate and its TURN server.
    pub fn relay_protocol(&self) -> Option<TransportProtocol> {
        self.relay_protocol
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn network_id(&self) -> u16 {
        self.network_id
    }

    pub fn network_cost(&self) -> u16 {
        self.network_cost
    }

    /// ICE username fragment the candidate belongs to.
    pub fn ufrag(&self) -> &str {
        &self.ufrag
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn set_generation(&mut self, generation: u32) {
        self.generation = generation;
    }

    pub(crate) fn set_ufrag(&mut self, ufrag: &str) {
        ufrag.clone_into(&mut self.ufrag);
    }

    pub(crate) fn set_password(&mut self, password: &str) {
        password.clone_into(&mut self.password);
    }

    pub(crate) fn set_network_cost(&mut self, network_cost: u16) {
        self.network_cost = network_cost;
    }

    pub(crate) fn set_network_id(&mut self, network_id: u16) {
        self.network_id = network_id;
    }

    pub(crate) fn set_priority(&mut self, priority: u32) {
        self.priority_override = priority;
    }

    /// Computes the priority for this ICE Candidate.
    pub fn priority(&self) -> u32 {
        if self.priority_override != 0 {
            return self.priority_override;
        }

        // The local preference MUST be an integer from 0 (lowest preference) to
        // 65535 (highest preference) inclusive.  When there is only a single IP
        // address, this value SHOULD be set to 65535.  If there are multiple
        // candidates for a particular component for a particular data stream
        // that have the same type, the local preference MUST be unique for each
        // one.
        (1 << 24) * u32::from(self.candidate_type().preference())
            + (1 << 8) * u32::from(self.local_preference())
            + (256 - u32::from(self.component()))
    }

    /// Returns the local preference for this candidate.
    pub fn local_preference(&self) -> u16 {
        if self.protocol == TransportProtocol::TCP {
            // RFC 6544, section 4.2
            //
            //     local preference = (2^13) * direction-pref + other-pref
            //
            // Host and relayed candidates prefer active (6), then passive (4),
            // then S-O (2). Reflexive candidates prefer S-O (6), then active (4),
            // then passive (2). other-pref is 8191 for a single-homed host.
            let other_pref: u16 = 8191;

            let direction_pref: u16 = match self.candidate_type() {
                CandidateType::Host | CandidateType::Relay => match self.tcp_type() {
                    TcpType::Active => 6,
                    TcpType::Passive => 4,
                    TcpType::SimultaneousOpen => 2,
                    TcpType::Unspecified => 0,
                },
                CandidateType::PeerReflexive | CandidateType::ServerReflexive => {
                    match self.tcp_type() {
                        TcpType::SimultaneousOpen => 6,
                        TcpType::Active => 4,
                        TcpType::Passive => 2,
                        TcpType::Unspecified => 0,
                    }
                }
                CandidateType::Unspecified => 0,
            };

            (1 << 13) * direction_pref + other_pref
        } else {
            DEFAULT_LOCAL_PREFERENCE
        }
    }

    /// Returns the string representation of the ICECandidate.
    pub fn marshal(&self) -> String {
        let mut val = format!(
            "{} {} {} {} {} {} typ {}",
            self.foundation(),
            self.component(),
            self.protocol(),
            self.priority(),
            self.address.ip(),
            self.address.port(),
            self.candidate_type()
        );

        if let Some(related_address) = self.related_address {
            val += format!(
                " raddr {} rport {}",
                related_address.ip(),
                related_address.port(),
            )
            .as_str();
        }

        if self.tcp_type != TcpType::Unspecified {
            val += format!(" tcptype {}", self.tcp_type()).as_str();
        }

        val += format!(" generation {}", self.generation).as_str();

        if !self.ufrag.is_empty() {
            val += format!(" ufrag {}", self.ufrag).as_str();
        }

        if self.network_id != 0 {
            val += format!(" network-id {}", self.network_id).as_str();
        }

        if self.network_cost != 0 {
            val += format!(" network-cost {}", self.network_cost).as_str();
        }

        val
    }

    /// Two candidates describing the same endpoint of the same generation.
    pub fn is_equivalent(&self, other: &Candidate) -> bool {
        self.component == other.component
            && self.protocol == other.protocol
            && self.address == other.address
            && self.candidate_type == other.candidate_type
            && self.related_address == other.related_address
            && self.generation == other.generation
    }

    /// Whether `other` names this candidate in a removal request.
    pub fn matches_for_removal(&self, other: &Candidate) -> bool {
        self.component == other.component
            && self.protocol == other.protocol
            && self.address == other.address
    }
}

/// Creates a Candidate from its string representation.
pub fn unmarshal_candidate(raw: &str) -> Result<Candidate> {
    let raw = raw.strip_prefix("a=").unwrap_or(raw);
    let raw = raw.strip_prefix("candidate:").unwrap_or(raw);
    let split: Vec<&str> = raw.split_whitespace().collect();
    if split.len() < 8 {
        return Err(Error::Other(format!(
            "{:?} ({})",
            Error::ErrAttributeTooShortIceCandidate,
            split.len()
        )));
    }

    // Foundation
    let foundation = split[0].to_owned();

    // Component
    let component: u16 = split[1].parse()?;

    // Network
    let network = split[2].to_owned();

    // Priority
    let priority: u32 = split[3].parse()?;

    // Address
    let address = split[4].to_owned();

    // Port
    let port: u16 = split[5].parse()?;

    if split[6] != "typ" {
        return Err(Error::ErrParseType);
    }
    let typ = split[7];

    let mut rel_addr = String::new();
    let mut rel_port = 0;
    let mut tcp_type = TcpType::Unspecified;
    let mut generation = 0;
    let mut ufrag = String::new();
    let mut network_id = 0;
    let mut network_cost = 0;

    let extensions = &split[8..];
    if extensions.len() % 2 != 0 {
        return Err(Error::Other(format!(
            "{:?}: incorrect length",
            Error::ErrParseRelatedAddr
        )));
    }
    for kv in extensions.chunks(2) {
        match kv[0] {
            "raddr" => kv[1].clone_into(&mut rel_addr),
            "rport" => rel_port = kv[1].parse()?,
            "tcptype" => tcp_type = TcpType::from(kv[1]),
            "generation" => generation = kv[1].parse()?,
            "ufrag" => kv[1].clone_into(&mut ufrag),
            "network-id" => network_id = kv[1].parse()?,
            "network-cost" => network_cost = kv[1].parse()?,
            _ => log::debug!("ignoring unknown candidate extension {}", kv[0]),
        }
    }

    let base_config = CandidateConfig {
        network,
        address,
        port,
        component,
        priority,
        foundation,
        generation,
        network_id,
        network_cost,
        ufrag,
        ..CandidateConfig::default()
    };

    match typ {
        "host" => CandidateHostConfig {
            base_config,
            tcp_type,
        }
        .new_candidate_host(),
        "srflx" => CandidateServerReflexiveConfig {
            base_config,
            rel_addr,
            rel_port,
        }
        .new_candidate_server_reflexive(),
        "prflx" => CandidatePeerReflexiveConfig {
            base_config,
            rel_addr,
            rel_port,
        }
        .new_candidate_peer_reflexive(),
        "relay" => CandidateRelayConfig {
            base_config,
            rel_addr,
            rel_port,
            relay_protocol: TransportProtocol::UDP,
        }
        .new_candidate_relay(),
        _ => Err(Error::Other(format!(
            "{:?} ({})",
            Error::ErrUnknownCandidateType,
            typ
        ))),
    }
}
