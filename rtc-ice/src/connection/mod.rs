
pub(crate) mod connection_registry;

use serde::Serialize;
use shared::TransportContext;
use std::fmt;
use std::time::{Duration, Instant};

use crate::candidate::{Candidate, CandidateType};
use crate::message::TransactionId;
use crate::network::NetworkId;
use crate::port::{Port, PortId};
use crate::role::IceRole;

/// A writable connection becomes unreliable after this many pings in a row
/// went unanswered past the RTT estimate...
pub(crate) const CONNECTION_WRITE_CONNECT_FAILURES: usize = 5;
/// ...and the oldest unanswered ping is at least this old.
pub(crate) const CONNECTION_WRITE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// An unreliable or fresh connection times out when no ping was answered for this long.
pub(crate) const CONNECTION_WRITE_TIMEOUT: Duration = Duration::from_secs(15);
/// A connection is never considered dead before it lived this long.
pub(crate) const MIN_CONNECTION_LIFETIME: Duration = Duration::from_secs(10);

pub(crate) const DEFAULT_RTT: Duration = Duration::from_millis(3000);
pub(crate) const MINIMUM_RTT: Duration = Duration::from_millis(100);
pub(crate) const MAXIMUM_RTT: Duration = Duration::from_millis(3000);
/// Weight of the previous estimate when smoothing RTT samples.
pub(crate) const RTT_RATIO: u32 = 3;

/// Type preference of a peer reflexive candidate, sent as PRIORITY in checks.
const PRFLX_TYPE_PREFERENCE: u32 = 110;

/// Handle of a connection. Handles are never reused within one channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Whether a connection is believed able to send. Lower is better.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum WriteState {
    /// A recent ping got a response.
    #[serde(rename = "writable")]
    Writable = 0,
    /// Was writable, but several pings in a row went unanswered.
    #[serde(rename = "write-unreliable")]
    WriteUnreliable = 1,
    /// No ping answered yet.
    #[default]
    #[serde(rename = "init")]
    Init = 2,
    /// No response for a long time; only a fresh binding request revives it.
    #[serde(rename = "write-timeout")]
    WriteTimeout = 3,
}

impl fmt::Display for WriteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            WriteState::Writable => "W",
            WriteState::WriteUnreliable => "w",
            WriteState::Init => "-",
            WriteState::WriteTimeout => "x",
        };
        write!(f, "{s}")
    }
}

/// Represent the ICE candidate pair check state.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum CandidatePairState {
    /// Means a check has not been performed for this pair.
    #[default]
    #[serde(rename = "waiting")]
    Waiting,

    /// Means a check has been sent for this pair, but the transaction is in progress.
    #[serde(rename = "in-progress")]
    InProgress,

    /// Means a check for this pair was already done and failed, either never producing any response
    /// or producing an unrecoverable failure response.
    #[serde(rename = "failed")]
    Failed,

    /// Means a check for this pair was already done and produced a successful result.
    #[serde(rename = "succeeded")]
    Succeeded,
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
        };

        write!(f, "{s}")
    }
}

/// A ping that has not been answered yet.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct SentPing {
    pub(crate) transaction_id: TransactionId,
    pub(crate) sent_at: Instant,
    pub(crate) use_candidate: bool,
}

/// The flags whose change requires the channel to re-sort.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct ConnectionStatus {
    pub(crate) write_state: WriteState,
    pub(crate) receiving: bool,
    pub(crate) connected: bool,
}

/// A local and a remote candidate paired for connectivity checks.
#[derive(Debug, Clone)]
pub struct Connection {
    pub(crate) id: ConnectionId,
    pub(crate) port: PortId,
    pub(crate) network_id: NetworkId,
    pub(crate) port_generation: u32,
    pub(crate) local: Candidate,
    pub(crate) remote: Candidate,
    pub(crate) ice_role: IceRole,

    pub(crate) write_state: WriteState,
    pub(crate) receiving: bool,
    pub(crate) connected: bool,
    pub(crate) nominated: bool,
    pub(crate) pruned: bool,
    pub(crate) use_candidate_attr: bool,
    pub(crate) state: CandidatePairState,

    pub(crate) rtt: Duration,
    pub(crate) created: Instant,
    pub(crate) receiving_timeout: Duration,
    pub(crate) last_ping_sent: Option<Instant>,
    pub(crate) last_ping_received: Option<Instant>,
    pub(crate) last_ping_response_received: Option<Instant>,
    pub(crate) last_data_received: Option<Instant>,
    pub(crate) pings_since_last_response: Vec<SentPing>,
    pub(crate) num_pings_sent: u32,

    pub(crate) reported: bool,
    pub(crate) bytes_sent: usize,
    pub(crate) bytes_received: usize,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}:{} {} <-> {}|{}{}{}{}|{}|{}ms]",
            self.id,
            self.port,
            self.network_id,
            self.local,
            self.remote,
            if self.connected { 'C' } else { '-' },
            if self.receiving { 'R' } else { '-' },
            self.write_state,
            if self.nominated { 'N' } else { '-' },
            self.state,
            self.rtt.as_millis(),
        )
    }
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        port: &Port,
        local: Candidate,
        remote: Candidate,
        ice_role: IceRole,
        receiving_timeout: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id,
            port: port.id(),
            network_id: port.network().id(),
            port_generation: port.generation(),
            local,
            remote,
            ice_role,
            write_state: WriteState::Init,
            receiving: false,
            connected: true,
            nominated: false,
            pruned: false,
            use_candidate_attr: false,
            state: CandidatePairState::Waiting,
            rtt: DEFAULT_RTT,
            created: now,
            receiving_timeout,
            last_ping_sent: None,
            last_ping_received: None,
            last_ping_response_received: None,
            last_data_received: None,
            pings_since_last_response: vec![],
            num_pings_sent: 0,
            reported: false,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn local_candidate(&self) -> &Candidate {
        &self.local
    }

    pub fn remote_candidate(&self) -> &Candidate {
        &self.remote
    }

    pub fn write_state(&self) -> WriteState {
        self.write_state
    }

    pub fn writable(&self) -> bool {
        self.write_state == WriteState::Writable
    }

    pub fn receiving(&self) -> bool {
        self.receiving
    }

    /// False while a TCP socket is reconnecting.
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn nominated(&self) -> bool {
        self.nominated
    }

    pub fn pruned(&self) -> bool {
        self.pruned
    }

    /// Anything short of a write timeout still counts as a live path.
    pub fn active(&self) -> bool {
        self.write_state != WriteState::WriteTimeout
    }

    pub fn weak(&self) -> bool {
        !(self.writable() && self.receiving && self.connected)
    }

    pub fn state(&self) -> CandidatePairState {
        self.state
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn num_pings_sent(&self) -> u32 {
        self.num_pings_sent
    }

    pub fn last_ping_sent(&self) -> Option<Instant> {
        self.last_ping_sent
    }

    pub fn last_ping_received(&self) -> Option<Instant> {
        self.last_ping_received
    }

    pub fn last_ping_response_received(&self) -> Option<Instant> {
        self.last_ping_response_received
    }

    /// The generation used to prefer pairs gathered after an ICE restart.
    pub fn generation(&self) -> u32 {
        self.remote.generation() + self.port_generation
    }

    /// The more expensive of the two ends.
    pub fn network_cost(&self) -> u16 {
        std::cmp::max(self.local.network_cost(), self.remote.network_cost())
    }

    /// RFC 8445 6.1.2.3 pair priority.
    /// Let G be the priority for the candidate provided by the controlling
    /// agent. Let D be the priority for the candidate provided by the
    /// controlled agent.
    /// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
    pub fn priority(&self) -> u64 {
        let (g, d) = if self.ice_role == IceRole::Controlling {
            (self.local.priority(), self.remote.priority())
        } else {
            (self.remote.priority(), self.local.priority())
        };

        // 1<<32 overflows uint32; and if both g && d are
        // maxUint32, this result would overflow uint64
        ((1 << 32_u64) - 1) * u64::from(std::cmp::min(g, d))
            + 2 * u64::from(std::cmp::max(g, d))
            + u64::from(g > d)
    }

    /// PRIORITY attribute of our checks: the local candidate re-typed as peer reflexive.
    pub(crate) fn prflx_priority(&self) -> u32 {
        (PRFLX_TYPE_PREFERENCE << 24) | (self.local.priority() & 0x00FF_FFFF)
    }

    pub(crate) fn transport(&self) -> TransportContext {
        TransportContext {
            local_addr: self.local.address(),
            peer_addr: self.remote.address(),
            transport_protocol: self.local.protocol(),
        }
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            write_state: self.write_state,
            receiving: self.receiving,
            connected: self.connected,
        }
    }

    pub(crate) fn set_ice_role(&mut self, ice_role: IceRole) {
        self.ice_role = ice_role;
    }

    pub(crate) fn set_receiving_timeout(&mut self, receiving_timeout: Duration) {
        self.receiving_timeout = receiving_timeout;
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub(crate) fn set_nominated(&mut self) {
        self.nominated = true;
    }

    pub(crate) fn has_pending_ping(&self, transaction_id: TransactionId) -> bool {
        self.pings_since_last_response
            .iter()
            .any(|p| p.transaction_id == transaction_id)
    }

    pub(crate) fn ping(
        &mut self,
        now: Instant,
        transaction_id: TransactionId,
        use_candidate: bool,
    ) {
        self.last_ping_sent = Some(now);
        self.pings_since_last_response.push(SentPing {
            transaction_id,
            sent_at: now,
            use_candidate,
        });
        self.use_candidate_attr = use_candidate;
        self.num_pings_sent += 1;
        if self.state == CandidatePairState::Waiting {
            self.state = CandidatePairState::InProgress;
        }
    }

    pub(crate) fn received_ping(&mut self, now: Instant) {
        self.last_ping_received = Some(now);
        self.update_receiving(now);
        if self.write_state == WriteState::WriteTimeout && !self.pruned {
            self.write_state = WriteState::Init;
        }
    }

    /// Records the response to one of our pings. Returns whether that ping
    /// carried USE-CANDIDATE, or `None` if the transaction is not ours.
    pub(crate) fn received_ping_response(
        &mut self,
        now: Instant,
        transaction_id: TransactionId,
    ) -> Option<bool> {
        let ping = self
            .pings_since_last_response
            .iter()
            .find(|p| p.transaction_id == transaction_id)
            .copied()?;

        let sample = now.saturating_duration_since(ping.sent_at);
        self.rtt = (self.rtt * RTT_RATIO + sample) / (RTT_RATIO + 1);
        self.pings_since_last_response.clear();
        self.last_ping_response_received = Some(now);
        self.write_state = WriteState::Writable;
        self.state = CandidatePairState::Succeeded;
        self.update_receiving(now);

        Some(ping.use_candidate)
    }

    pub(crate) fn received_data(&mut self, now: Instant, len: usize) {
        self.last_data_received = Some(now);
        self.bytes_received += len;
        self.update_receiving(now);
    }

    pub(crate) fn sent_data(&mut self, len: usize) {
        self.bytes_sent += len;
    }

    /// Refreshes the write and receive state from elapsed time.
    pub(crate) fn update_state(&mut self, now: Instant) {
        let rtt = self.conservative_rtt_estimate();

        if self.write_state == WriteState::Writable
            && self.too_many_failures(CONNECTION_WRITE_CONNECT_FAILURES, rtt, now)
            && self.too_long_without_response(CONNECTION_WRITE_CONNECT_TIMEOUT, now)
        {
            log::debug!(
                "{}: unwritable after {} pings without response",
                self.id,
                self.pings_since_last_response.len()
            );
            self.write_state = WriteState::WriteUnreliable;
        }

        if matches!(
            self.write_state,
            WriteState::WriteUnreliable | WriteState::Init
        ) && self.too_long_without_response(CONNECTION_WRITE_TIMEOUT, now)
        {
            log::debug!("{}: write timed out", self.id);
            self.write_state = WriteState::WriteTimeout;
        }

        self.update_receiving(now);
    }

    /// A connection that timed out, hears nothing and had time to prove itself.
    pub(crate) fn dead(&self, now: Instant) -> bool {
        if now < self.created + MIN_CONNECTION_LIFETIME {
            return false;
        }
        !self.receiving && self.write_state == WriteState::WriteTimeout
    }

    pub(crate) fn prune(&mut self) {
        if !self.pruned || self.active() {
            log::info!("{}: connection pruned", self);
            self.pruned = true;
            self.pings_since_last_response.clear();
            self.write_state = WriteState::WriteTimeout;
        }
    }

    pub(crate) fn fail(&mut self) {
        self.state = CandidatePairState::Failed;
    }

    /// Adopts a signaled candidate in place of the peer reflexive one learned
    /// from a check, keeping the priority the peer already put on the wire.
    pub(crate) fn maybe_update_peer_reflexive_candidate(&mut self, candidate: &Candidate) {
        if self.remote.candidate_type() == CandidateType::PeerReflexive
            && candidate.candidate_type() != CandidateType::PeerReflexive
            && self.remote.protocol() == candidate.protocol()
            && self.remote.address() == candidate.address()
            && self.remote.ufrag() == candidate.ufrag()
            && self.remote.generation() == candidate.generation()
        {
            let priority = self.remote.priority();
            let mut updated = candidate.clone();
            updated.set_priority(priority);
            self.remote = updated;
        }
    }

    pub(crate) fn maybe_set_remote_ice_credentials(
        &mut self,
        ufrag: &str,
        pwd: &str,
        generation: u32,
    ) {
        if self.remote.ufrag() != ufrag {
            return;
        }
        if self.remote.password().is_empty() {
            self.remote.set_password(pwd);
        }
        // Generation 0 doubles as "unknown" for candidates learned from checks.
        if self.remote.password() == pwd && self.remote.generation() == 0 {
            self.remote.set_generation(generation);
        }
    }

    fn conservative_rtt_estimate(&self) -> Duration {
        (self.rtt * 2).clamp(MINIMUM_RTT, MAXIMUM_RTT)
    }

    fn too_many_failures(&self, maximum_failures: usize, rtt: Duration, now: Instant) -> bool {
        if self.pings_since_last_response.len() < maximum_failures {
            return false;
        }
        let expected_response_time =
            self.pings_since_last_response[maximum_failures - 1].sent_at + rtt;
        now > expected_response_time
    }

    fn too_long_without_response(&self, maximum_time: Duration, now: Instant) -> bool {
        match self.pings_since_last_response.first() {
            Some(first) => now > first.sent_at + maximum_time,
            None => false,
        }
    }

    fn last_received(&self) -> Option<Instant> {
        [
            self.last_ping_received,
            self.last_data_received,
            self.last_ping_response_received,
        ]
        .into_iter()
        .flatten()
        .max()
    }

    fn update_receiving(&mut self, now: Instant) {
        self.receiving = self
            .last_received()
            .is_some_and(|last| last + self.receiving_timeout >= now);
    }
}
