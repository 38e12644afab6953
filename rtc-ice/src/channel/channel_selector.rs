use super::channel_comparator::*;
use super::*;
use crate::connection::WriteState;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Decides whether `candidate` should replace `best` as the selected connection.
pub(crate) fn should_switch(
    best: Option<&Connection>,
    candidate: Option<&Connection>,
    ice_role: IceRole,
) -> bool {
    let Some(candidate) = candidate else {
        return false;
    };
    let Some(best) = best else {
        return true;
    };
    if best.id() == candidate.id() {
        return false;
    }

    match compare_states(candidate, best) {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }

    // The controlled side must not abandon what the controlling side nominated.
    if ice_role == IceRole::Controlled && best.nominated() {
        return false;
    }

    match compare_candidates(candidate, best) {
        Ordering::Greater => return true,
        Ordering::Less => return false,
        Ordering::Equal => {}
    }

    candidate.rtt() + MIN_IMPROVEMENT <= best.rtt()
}

impl Channel {
    /// Re-ranks all connections, then re-evaluates selection, pruning and the
    /// aggregate state.
    pub(crate) fn sort_connections(&mut self) {
        // Connection states affect the ranking, so refresh them first. Any
        // change after this point requires another sort.
        self.update_connection_states();
        self.sort_dirty = false;

        self.connections.sort_by(|a, b| compare_connections(b, a));

        if log::log_enabled!(log::Level::Trace) {
            for connection in self.connections.iter() {
                log::trace!("[{}]: {}", self.get_name(), connection);
            }
        }

        let top = self.connections.ids().first().copied();
        if should_switch(
            self.best_connection(),
            top.and_then(|id| self.connections.get(id)),
            self.ice_role,
        ) {
            self.switch_to(top);
        }

        // The controlled side prunes only after something was nominated,
        // otherwise it may drop the pair the controlling side will pick.
        if self.ice_role == IceRole::Controlling || self.best_nominated_connection().is_some() {
            self.prune_connections();
        }

        let all_timed_out = !self.connections.is_empty()
            && self
                .connections
                .iter()
                .all(|c| c.write_state() == WriteState::WriteTimeout);
        if all_timed_out {
            self.handle_all_timed_out();
        }

        self.update_state();
        self.maybe_start_pinging();
    }

    /// Makes `id` the connection packets are sent on.
    pub(crate) fn switch_to(&mut self, id: Option<ConnectionId>) {
        let previous = self.best_connection;
        self.best_connection = id;

        match self.best_connection() {
            Some(connection) => {
                if let Some(previous) = previous {
                    info!(
                        "[{}]: Previous best connection: {}",
                        self.get_name(),
                        previous
                    );
                }
                info!("[{}]: New best connection: {}", self.get_name(), connection);
                let remote = connection.remote_candidate().clone();
                let writable = connection.writable();
                self.event_outs.push_back(Event::RouteChange(remote));
                if writable {
                    self.event_outs.push_back(Event::ReadyToSend);
                }
            }
            None => info!("[{}]: No best connection", self.get_name()),
        }

        self.event_outs
            .push_back(Event::SelectedCandidatePairChange {
                connection: self.best_connection,
                last_sent_packet_id: self.last_sent_packet_id,
            });
    }

    pub(crate) fn best_nominated_connection(&self) -> Option<&Connection> {
        self.best_connection().filter(|c| c.nominated())
    }

    /// Nomination received on the controlled side.
    pub(crate) fn on_nominated(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get(id) else {
            return;
        };

        if connection.writable() {
            if self.best_connection != Some(id) {
                self.pending_best_connection = None;
                info!(
                    "[{}]: Switching best connection on controlled side: {}",
                    self.get_name(),
                    connection
                );
                self.switch_to(Some(id));
                // Prune the rest and refresh the channel state.
                self.request_sort();
            }
        } else {
            info!(
                "[{}]: Not switching the best connection on controlled side yet, because it's not writable: {}",
                self.get_name(),
                connection
            );
            self.pending_best_connection = Some(id);
        }
    }

    /// Until something is nominated, the controlled side sends where the
    /// controlling side's media arrives from.
    pub(crate) fn maybe_switch_on_data(&mut self, id: ConnectionId) {
        if self.ice_role != IceRole::Controlled
            || self.best_nominated_connection().is_some()
            || self.best_connection == Some(id)
        {
            return;
        }
        if self.connections.get(id).is_some_and(|c| c.writable()) {
            self.switch_to(Some(id));
        }
    }

    fn handle_all_timed_out(&mut self) {
        info!(
            "[{}]: All connections timed out, destroying them",
            self.get_name()
        );
        for id in self.connections.ids() {
            self.destroy_connection(id);
        }
    }

    /// Derives the transport state from the connection population.
    pub(crate) fn compute_state(&self) -> IceTransportState {
        if !self.had_connection {
            return IceTransportState::Init;
        }

        let mut networks = HashSet::new();
        let mut any_active = false;
        for connection in self.connections.iter().filter(|c| c.active()) {
            any_active = true;
            if !networks.insert(connection.network_id()) {
                // Still deciding between paths on this network.
                return IceTransportState::Connecting;
            }
        }

        if any_active {
            IceTransportState::Completed
        } else {
            IceTransportState::Failed
        }
    }

    pub(crate) fn update_state(&mut self) {
        let state = self.compute_state();
        if self.state != state {
            if self.state == IceTransportState::Init && state == IceTransportState::Failed {
                // Every connection vanished before the first evaluation.
                debug!(
                    "[{}]: Staying in {} with no connection left",
                    self.get_name(),
                    self.state
                );
            } else {
                assert!(
                    self.state.can_transition_to(state),
                    "illegal transport state transition {} -> {}",
                    self.state,
                    state
                );
                info!(
                    "[{}]: Transport channel state changed from {} to {}",
                    self.get_name(),
                    self.state,
                    state
                );
                self.state = state;
                self.event_outs.push_back(Event::StateChange(state));
            }
        }

        let writable = self.best_connection().is_some_and(|c| c.writable());
        self.set_writable(writable);

        let receiving = self.connections.iter().any(|c| c.receiving());
        self.set_receiving(receiving);
    }

    fn set_writable(&mut self, writable: bool) {
        if self.writable == writable {
            return;
        }
        debug!("[{}]: Writable changed to {}", self.get_name(), writable);
        self.writable = writable;
        if writable {
            self.event_outs.push_back(Event::ReadyToSend);
        }
        self.event_outs.push_back(Event::WritableChange(writable));
    }

    fn set_receiving(&mut self, receiving: bool) {
        if self.receiving == receiving {
            return;
        }
        debug!("[{}]: Receiving changed to {}", self.get_name(), receiving);
        self.receiving = receiving;
        self.event_outs.push_back(Event::ReceivingChange(receiving));
    }
}
