use serde::Serialize;

use super::*;
use crate::connection::{CandidatePairState, WriteState};

/// Snapshot of one connection, as reported by [`Channel::get_stats`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub connection: ConnectionId,
    /// The connection currently used for sending.
    pub best: bool,
    pub writable: bool,
    pub receiving: bool,
    /// Write timed out.
    pub timeout: bool,
    /// First time this connection shows up in a report.
    pub new: bool,
    pub nominated: bool,
    pub pruned: bool,
    pub state: CandidatePairState,
    pub rtt_ms: u64,
    pub pings_sent: u32,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub priority: u64,
    pub local_candidate: Candidate,
    pub remote_candidate: Candidate,
}

impl Channel {
    /// One row per live connection, ranked best first. Marks every row as
    /// reported, so `new` is only set once per connection.
    pub fn get_stats(&mut self) -> Vec<ConnectionInfo> {
        let best = self.best_connection;
        let mut infos = vec![];
        for id in self.connections.ids() {
            let Some(c) = self.connections.get_mut(id) else {
                continue;
            };
            infos.push(ConnectionInfo {
                connection: id,
                best: best == Some(id),
                writable: c.writable(),
                receiving: c.receiving(),
                timeout: c.write_state() == WriteState::WriteTimeout,
                new: !c.reported,
                nominated: c.nominated(),
                pruned: c.pruned(),
                state: c.state(),
                rtt_ms: c.rtt().as_millis() as u64,
                pings_sent: c.num_pings_sent(),
                bytes_sent: c.bytes_sent,
                bytes_received: c.bytes_received,
                priority: c.priority(),
                local_candidate: c.local_candidate().clone(),
                remote_candidate: c.remote_candidate().clone(),
            });
            c.reported = true;
        }
        infos
    }
}
