use super::channel_comparator::compare_candidates;
use super::*;
use crate::network::NetworkId;
use std::cmp::Ordering;

impl Channel {
    /// Prunes every connection for which a strongly connected connection on
    /// the same network with better or equal candidates exists. Statically
    /// better connections are left alone in case they become writable later,
    /// and connections on other networks may be distinct paths to fall back on.
    pub(crate) fn prune_connections(&mut self) {
        let mut to_prune = vec![];
        for connection in self.connections.iter() {
            let Some(premier) = self.premier_connection(connection.network_id()) else {
                continue;
            };
            // A weak premier could take the only working path down with it.
            if premier.id() == connection.id() || premier.weak() {
                continue;
            }
            if compare_candidates(premier, connection) != Ordering::Less {
                to_prune.push(connection.id());
            }
        }

        for id in to_prune {
            self.with_connection(id, |c| c.prune());
        }
    }

    /// The best connection if it is on `network`, otherwise the top ranked
    /// connection there.
    fn premier_connection(&self, network: NetworkId) -> Option<&Connection> {
        if let Some(best) = self.best_connection()
            && best.network_id() == network
        {
            return Some(best);
        }
        self.connections.iter().find(|c| c.network_id() == network)
    }
}
