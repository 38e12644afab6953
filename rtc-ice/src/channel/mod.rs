//! Sans-I/O ICE transport channel.
//!
//! A [`Channel`] runs the connectivity checks of one ICE component. It pairs
//! local ports with remote candidates, pings the resulting connections, ranks
//! them, picks the one to send on and prunes the redundant ones. It performs
//! no I/O: the port layer feeds it decoded STUN traffic and lifecycle events,
//! and carries out the [`Command`]s it produces.
//!
//! # Driving a channel
//!
//! 1. Announce local ports with [`TransportEvent::PortReady`] through
//!    [`handle_event()`](sansio::Protocol::handle_event) and forward the
//!    resulting [`Event::CandidateGathered`] to the peer
//! 2. Apply the peer's credentials and candidates with
//!    [`Channel::set_remote_credentials`] and [`Channel::add_remote_candidate`]
//! 3. Call [`Channel::connect`] to start pinging
//! 4. Call [`handle_timeout()`](sansio::Protocol::handle_timeout) whenever
//!    [`poll_timeout()`](sansio::Protocol::poll_timeout) expires
//! 5. Execute every [`Command`] from [`poll_write()`](sansio::Protocol::poll_write),
//!    and pass STUN traffic back through [`handle_read()`](sansio::Protocol::handle_read)
//! 6. Watch [`poll_event()`](sansio::Protocol::poll_event) for the selected
//!    connection and the transport state
//!
//! All work the channel schedules for itself (re-sorting, the ping tick) is
//! deferred through its task queue and runs from `handle_timeout`, never
//! inline in the call that requested it.


pub mod channel_config;
pub(crate) mod channel_comparator;
mod channel_pinger;
mod channel_proto;
mod channel_pruner;
mod channel_remote;
mod channel_selector;
pub mod channel_stats;

use bytes::BytesMut;
use channel_config::*;
use log::{debug, error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use crate::candidate::Candidate;
use crate::connection::connection_registry::ConnectionRegistry;
use crate::connection::{Connection, ConnectionId};
use crate::message::*;
use crate::network::{DefaultNetworkCost, NetworkCost};
use crate::port::Port;
use crate::rand::*;
use crate::role::{IceMode, IceParameters, IceRole};
use crate::state::IceTransportState;
use crate::task::{Task, TaskQueue};
use shared::error::*;
use shared::{TaggedBytesMut, TransportContext, TransportMessage};

/// Notifications for the signaling layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A local candidate is ready to be signaled to the peer.
    CandidateGathered(Candidate),
    /// The connection used for sending changed. `last_sent_packet_id` is the
    /// id of the last packet sent before the change.
    SelectedCandidatePairChange {
        connection: Option<ConnectionId>,
        last_sent_packet_id: Option<u64>,
    },
    /// Packets now flow to this remote candidate.
    RouteChange(Candidate),
    StateChange(IceTransportState),
    WritableChange(bool),
    ReceivingChange(bool),
    ReadyToSend,
    /// Both peers claim the same role; the signaling layer decides who flips.
    RoleConflict,
    /// A connection is strongly connected; further gathering is unnecessary.
    StopGathering,
    /// Every port finished gathering.
    GatheringComplete,
}

/// Connectivity-check engine for one ICE component.
pub struct Channel {
    pub(crate) transport_name: String,
    pub(crate) component: u16,
    pub(crate) ice_role: IceRole,
    pub(crate) tiebreaker: u64,
    pub(crate) local_params: IceParameters,
    /// Every remote credential generation seen, oldest first.
    pub(crate) remote_params: Vec<IceParameters>,
    pub(crate) remote_ice_mode: IceMode,
    pub(crate) incoming_only: bool,
    pub(crate) config: IceConfig,
    pub(crate) network_cost: Arc<dyn NetworkCost>,

    pub(crate) ports: Vec<Port>,
    pub(crate) remote_candidates: Vec<Candidate>,
    pub(crate) connections: ConnectionRegistry,
    pub(crate) best_connection: Option<ConnectionId>,
    /// Nominated on the controlled side before it became writable.
    pub(crate) pending_best_connection: Option<ConnectionId>,
    pub(crate) had_connection: bool,

    pub(crate) state: IceTransportState,
    pub(crate) writable: bool,
    pub(crate) receiving: bool,
    pub(crate) connect_requested: bool,
    pub(crate) started_pinging: bool,
    pub(crate) sort_dirty: bool,
    pub(crate) gathering_stopped: bool,
    pub(crate) last_sent_packet_id: Option<u64>,
    pub(crate) last_ping_sent: Option<Instant>,

    pub(crate) now: Instant,
    pub(crate) tasks: TaskQueue,
    pub(crate) closed: bool,

    pub(crate) read_outs: VecDeque<TaggedBytesMut>,
    pub(crate) write_outs: VecDeque<TransportMessage<Command>>,
    pub(crate) event_outs: VecDeque<Event>,
}

impl Channel {
    /// Creates a new channel.
    pub fn new(config: ChannelConfig, now: Instant) -> Result<Self> {
        let local_params = validate_local_credentials(&config.local_ufrag, &config.local_pwd)?;

        Ok(Self {
            transport_name: config.transport_name.clone(),
            component: config.get_component(),
            ice_role: config.ice_role,
            tiebreaker: config.ice_tiebreaker.unwrap_or_else(generate_tiebreaker),
            local_params,
            remote_params: vec![],
            remote_ice_mode: config.remote_ice_mode,
            incoming_only: config.incoming_only,
            config: config.ice_config,
            network_cost: config
                .network_cost
                .unwrap_or_else(|| Arc::new(DefaultNetworkCost) as Arc<dyn NetworkCost>),

            ports: vec![],
            remote_candidates: vec![],
            connections: ConnectionRegistry::default(),
            best_connection: None,
            pending_best_connection: None,
            had_connection: false,

            state: IceTransportState::Init,
            writable: false,
            receiving: false,
            connect_requested: false,
            started_pinging: false,
            sort_dirty: false,
            gathering_stopped: false,
            last_sent_packet_id: None,
            last_ping_sent: None,

            now,
            tasks: TaskQueue::default(),
            closed: false,

            read_outs: VecDeque::new(),
            write_outs: VecDeque::new(),
            event_outs: VecDeque::new(),
        })
    }

    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    pub fn component(&self) -> u16 {
        self.component
    }

    pub fn ice_role(&self) -> IceRole {
        self.ice_role
    }

    pub fn set_ice_role(&mut self, ice_role: IceRole) {
        if self.ice_role == ice_role {
            return;
        }
        info!("[{}]: ICE role changed to {}", self.get_name(), ice_role);
        self.ice_role = ice_role;
        for connection in self.connections.iter_mut() {
            connection.set_ice_role(ice_role);
        }
        self.request_sort();
    }

    pub fn ice_tiebreaker(&self) -> u64 {
        self.tiebreaker
    }

    pub fn set_ice_tiebreaker(&mut self, tiebreaker: u64) {
        self.tiebreaker = tiebreaker;
    }

    /// Returns the local user credentials.
    pub fn local_credentials(&self) -> &IceParameters {
        &self.local_params
    }

    /// Replaces the local credentials; empty values are generated.
    pub fn set_local_credentials(&mut self, ufrag: &str, pwd: &str) -> Result<()> {
        self.local_params = validate_local_credentials(ufrag, pwd)?;
        Ok(())
    }

    /// The current remote credentials, if any were set.
    pub fn remote_credentials(&self) -> Option<&IceParameters> {
        self.remote_params.last()
    }

    pub fn remote_ice_mode(&self) -> IceMode {
        self.remote_ice_mode
    }

    pub fn set_remote_ice_mode(&mut self, mode: IceMode) {
        self.remote_ice_mode = mode;
    }

    pub fn ice_config(&self) -> &IceConfig {
        &self.config
    }

    /// Applies the fields `config` sets, keeping the others.
    pub fn set_ice_config(&mut self, config: IceConfig) {
        self.config.merge(&config);
        let receiving_timeout = self.config.get_receiving_timeout();
        for connection in self.connections.iter_mut() {
            connection.set_receiving_timeout(receiving_timeout);
        }
        debug!(
            "[{}]: ICE config updated: {:?}",
            self.get_name(),
            self.config
        );
    }

    pub fn state(&self) -> IceTransportState {
        self.state
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn receiving(&self) -> bool {
        self.receiving
    }

    /// The connection packets are sent on.
    pub fn best_connection(&self) -> Option<&Connection> {
        self.best_connection.and_then(|id| self.connections.get(id))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    /// Connections ranked best first, as of the last sort.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter()
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    pub fn remote_candidates(&self) -> &[Candidate] {
        &self.remote_candidates
    }

    /// Starts connectivity checks once some connection can be pinged.
    pub fn connect(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.connect_requested = true;
        self.maybe_start_pinging();
        Ok(())
    }

    pub(crate) fn get_name(&self) -> &'static str {
        match self.ice_role {
            IceRole::Controlling => "controlling",
            IceRole::Controlled => "controlled",
            IceRole::Unknown => "unknown",
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::ErrChannelClosed)
        } else {
            Ok(())
        }
    }

    /// Whether the channel lacks a strongly connected best connection.
    pub(crate) fn weak(&self) -> bool {
        self.best_connection().is_none_or(|c| c.weak())
    }

    /// Posts a sort unless one is already pending.
    pub(crate) fn request_sort(&mut self) {
        if !self.sort_dirty {
            self.tasks.post_at(self.now, Task::Sort);
            self.sort_dirty = true;
        }
    }

    pub(crate) fn add_connection(&mut self, connection: Connection) {
        info!(
            "[{}]: Created connection {} ({} total)",
            self.get_name(),
            connection,
            self.connections.len() + 1
        );
        self.connections.insert(connection);
        self.had_connection = true;
    }

    /// Runs `f` on a connection and reacts if its status changed, the way a
    /// connection signals its own state changes.
    pub(crate) fn with_connection<R>(
        &mut self,
        id: ConnectionId,
        f: impl FnOnce(&mut Connection) -> R,
    ) -> Option<R> {
        let connection = self.connections.get_mut(id)?;
        let before = connection.status();
        let result = f(connection);
        if connection.status() != before {
            self.on_connection_state_change(id);
        }
        Some(result)
    }

    /// Refreshes every connection's timers, destroying the dead ones.
    pub(crate) fn update_connection_states(&mut self) {
        let now = self.now;
        for id in self.connections.ids() {
            self.with_connection(id, |c| c.update_state(now));
            if self.connections.get(id).is_some_and(|c| c.dead(now)) {
                debug!("[{}]: {} is dead", self.get_name(), id);
                self.destroy_connection(id);
            }
        }
    }

    fn on_connection_state_change(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get(id) else {
            return;
        };
        let writable = connection.writable();
        let strongly_connected = !connection.weak();
        let latest_generation = connection.port_generation >= self.latest_port_generation();

        if self.ice_role == IceRole::Controlled
            && self.pending_best_connection == Some(id)
            && writable
        {
            self.pending_best_connection = None;
            info!(
                "[{}]: Switching best connection on controlled side because it's now writable: {}",
                self.get_name(),
                id
            );
            self.switch_to(Some(id));
        }

        if strongly_connected && latest_generation {
            self.maybe_stop_gathering();
        }

        self.request_sort();
    }

    fn maybe_stop_gathering(&mut self) {
        if self.gathering_stopped || self.config.get_gather_continually() {
            return;
        }
        self.gathering_stopped = true;
        info!("[{}]: Strongly connected, stop gathering", self.get_name());
        self.event_outs.push_back(Event::StopGathering);
    }

    pub(crate) fn latest_port_generation(&self) -> u32 {
        self.ports
            .iter()
            .map(|p| p.generation())
            .max()
            .unwrap_or_default()
    }

    /// Asks the port layer to release a connection and forgets it.
    pub(crate) fn destroy_connection(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get(id) else {
            return;
        };
        self.write_outs.push_back(TransportMessage {
            now: self.now,
            transport: connection.transport(),
            message: Command::Destroy(id),
        });
        self.on_connection_destroyed(id);
    }

    /// Removes a connection from every index. Returns false if it was unknown.
    pub(crate) fn on_connection_destroyed(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.remove(id) else {
            return false;
        };
        info!(
            "[{}]: Removed connection {} ({} remaining)",
            self.get_name(),
            connection,
            self.connections.len()
        );

        if self.pending_best_connection == Some(id) {
            self.pending_best_connection = None;
        }

        if self.best_connection == Some(id) {
            info!(
                "[{}]: Best connection destroyed. Will choose a new one.",
                self.get_name()
            );
            self.switch_to(None);
            self.request_sort();
        }

        self.update_state();
        true
    }

    pub(crate) fn queue_command(&mut self, transport: TransportContext, command: Command) {
        self.write_outs.push_back(TransportMessage {
            now: self.now,
            transport,
            message: command,
        });
    }

    pub(crate) fn queue_read(&mut self, transport: TransportContext, payload: BytesMut) {
        self.read_outs.push_back(TransportMessage {
            now: self.now,
            transport,
            message: payload,
        });
    }

    pub(crate) fn advance(&mut self, now: Instant) {
        if now > self.now {
            self.now = now;
        }
    }

    fn destroy_all(&mut self) {
        for id in self.connections.ids() {
            if let Some(connection) = self.connections.get(id) {
                let transport = connection.transport();
                self.queue_command(transport, Command::Destroy(id));
            }
        }
        self.connections.clear();
        self.pending_best_connection = None;
        if self.best_connection.is_some() {
            self.switch_to(None);
        }
    }
}

fn validate_local_credentials(ufrag: &str, pwd: &str) -> Result<IceParameters> {
    let ufrag = if ufrag.is_empty() {
        generate_ufrag()
    } else {
        ufrag.to_owned()
    };
    let pwd = if pwd.is_empty() {
        generate_pwd()
    } else {
        pwd.to_owned()
    };

    if ufrag.len() * 8 < 24 {
        return Err(Error::ErrLocalUfragInsufficientBits);
    }
    if pwd.len() * 8 < 128 {
        return Err(Error::ErrLocalPwdInsufficientBits);
    }

    Ok(IceParameters { ufrag, pwd })
}

fn warn_discarded(name: &str, transport: &TransportContext, what: &str) {
    warn!(
        "[{}]: Discarded {} from unknown address {}:{} -> {}",
        name, what, transport.transport_protocol, transport.peer_addr, transport.local_addr
    );
}
