use shared::{TransportContext, TransportProtocol};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

use super::{Connection, ConnectionId};
use crate::message::TransactionId;
use crate::port::PortId;

/// Arena of live connections. `order` is the ranking produced by the last
/// sort; `pinged`/`unpinged` partition the ids for round-robin pinging.
/// Every index is updated together on insert and remove.
#[derive(Default, Debug)]
pub(crate) struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    order: Vec<ConnectionId>,
    pinged: BTreeSet<ConnectionId>,
    unpinged: BTreeSet<ConnectionId>,
    next_id: u64,
}

impl ConnectionRegistry {
    pub(crate) fn next_id(&mut self) -> ConnectionId {
        self.next_id += 1;
        ConnectionId(self.next_id)
    }

    pub(crate) fn insert(&mut self, connection: Connection) {
        let id = connection.id();
        self.order.push(id);
        self.unpinged.insert(id);
        self.connections.insert(id, connection);
    }

    pub(crate) fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let connection = self.connections.remove(&id)?;
        self.order.retain(|c| *c != id);
        self.pinged.remove(&id);
        self.unpinged.remove(&id);
        Some(connection)
    }

    pub(crate) fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids in ranking order, detached from the registry so callers may mutate
    /// or remove while walking them.
    pub(crate) fn ids(&self) -> Vec<ConnectionId> {
        self.order.clone()
    }

    /// Connections in ranking order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.order.iter().filter_map(|id| self.connections.get(id))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }

    /// Stable sort; equal connections keep their previous relative order.
    pub(crate) fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Connection, &Connection) -> Ordering,
    {
        let connections = &self.connections;
        self.order
            .sort_by(|a, b| compare(&connections[a], &connections[b]));
    }

    pub(crate) fn unpinged(&self) -> &BTreeSet<ConnectionId> {
        &self.unpinged
    }

    pub(crate) fn mark_pinged(&mut self, id: ConnectionId) {
        if self.unpinged.remove(&id) {
            self.pinged.insert(id);
        }
    }

    /// Starts a new ping round.
    pub(crate) fn refill_unpinged(&mut self) {
        self.unpinged.append(&mut self.pinged);
    }

    /// The newest connection on a 5-tuple.
    pub(crate) fn find(&self, transport: &TransportContext) -> Option<&Connection> {
        self.connections
            .values()
            .filter(|c| {
                c.local.address() == transport.local_addr
                    && c.remote.address() == transport.peer_addr
                    && c.local.protocol() == transport.transport_protocol
            })
            .max_by_key(|c| c.id())
    }

    /// The connection on a 5-tuple that is waiting for `transaction_id`.
    pub(crate) fn find_by_transaction(
        &self,
        transport: &TransportContext,
        transaction_id: TransactionId,
    ) -> Option<ConnectionId> {
        self.connections
            .values()
            .find(|c| {
                c.local.address() == transport.local_addr
                    && c.remote.address() == transport.peer_addr
                    && c.has_pending_ping(transaction_id)
            })
            .map(|c| c.id())
    }

    /// The newest connection a port already has toward a remote address.
    pub(crate) fn find_on_port(
        &self,
        port: PortId,
        remote_addr: SocketAddr,
        protocol: TransportProtocol,
    ) -> Option<&Connection> {
        self.connections
            .values()
            .filter(|c| {
                c.port == port
                    && c.remote.address() == remote_addr
                    && c.remote.protocol() == protocol
            })
            .max_by_key(|c| c.id())
    }

    pub(crate) fn on_port(&self, port: PortId) -> Vec<ConnectionId> {
        self.order
            .iter()
            .filter(|id| self.connections.get(id).is_some_and(|c| c.port == port))
            .copied()
            .collect()
    }

    pub(crate) fn clear(&mut self) -> Vec<ConnectionId> {
        let ids = std::mem::take(&mut self.order);
        self.connections.clear();
        self.pinged.clear();
        self.unpinged.clear();
        ids
    }
}
