use super::channel_comparator::compare_candidates;
use super::*;
use crate::candidate::CandidateType;
use crate::connection::CandidatePairState;
use shared::TransportProtocol;
use std::cmp::Ordering;

impl Channel {
    /// Starts the ping tick the first time some connection can be pinged.
    pub(crate) fn maybe_start_pinging(&mut self) {
        if self.started_pinging || !self.connect_requested || self.closed {
            return;
        }
        let now = self.now;
        if self.connections.iter().any(|c| self.is_pingable(c, now)) {
            info!(
                "[{}]: Have a pingable connection for the first time; starting to ping.",
                self.get_name()
            );
            self.tasks.post_at(now, Task::CheckAndPing);
            self.started_pinging = true;
        }
    }

    /// One tick of the ping loop: ping the next connection if the interval
    /// elapsed, then schedule the next tick.
    pub(crate) fn on_check_and_ping(&mut self) {
        // Pingability depends on up to date connection states.
        self.update_connection_states();

        let now = self.now;
        let need_more_pings_at_weak_interval = self
            .connections
            .iter()
            .any(|c| c.active() && c.num_pings_sent() < MIN_PINGS_AT_WEAK_PING_INTERVAL);
        let ping_interval = if self.weak() || need_more_pings_at_weak_interval {
            self.config.get_weak_ping_interval()
        } else {
            STRONG_PING_INTERVAL
        };

        if self
            .last_ping_sent
            .is_none_or(|last| now >= last + ping_interval)
            && let Some(id) = self.find_next_pingable_connection()
        {
            self.ping_connection(id);
            self.connections.mark_pinged(id);
        }

        let delay = std::cmp::min(ping_interval, self.config.check_receiving_interval());
        self.tasks.post_at(now + delay, Task::CheckAndPing);
    }

    pub(crate) fn find_next_pingable_connection(&mut self) -> Option<ConnectionId> {
        let now = self.now;
        let max_strong_interval = self.config.get_max_strong_interval();

        // Keep the known good path alive.
        if let Some(best) = self.best_connection()
            && best.connected()
            && best.writable()
            && best
                .last_ping_sent()
                .is_none_or(|last| last + max_strong_interval <= now)
        {
            return Some(best.id());
        }

        self.find_connection_to_ping(now)
    }

    fn find_connection_to_ping(&mut self, now: Instant) -> Option<ConnectionId> {
        // Once nothing unpinged is pingable, start the next round.
        let any_unpinged_pingable = self
            .connections
            .unpinged()
            .iter()
            .filter_map(|id| self.connections.get(*id))
            .any(|c| self.is_pingable(c, now));
        if !any_unpinged_pingable {
            self.connections.refill_unpinged();
        }

        if let Some(id) = self.find_oldest_connection_needing_triggered_check(now) {
            return Some(id);
        }

        let mut selected: Option<&Connection> = None;
        for connection in self.connections.iter() {
            if !self.is_pingable(connection, now)
                || !self.connections.unpinged().contains(&connection.id())
            {
                continue;
            }
            selected = Some(match selected {
                Some(current) => self.more_pingable(current, connection),
                None => connection,
            });
        }
        selected.map(|c| c.id())
    }

    /// A connection that was pinged by the peer but has not answered in kind,
    /// per the reciprocity rule for triggered checks.
    fn find_oldest_connection_needing_triggered_check(&self, now: Instant) -> Option<ConnectionId> {
        let mut oldest: Option<&Connection> = None;
        for connection in self.connections.iter() {
            if !self.is_pingable(connection, now) {
                continue;
            }
            let needs_triggered_check = !connection.writable()
                && connection.last_ping_received() > connection.last_ping_sent();
            if needs_triggered_check
                && oldest.is_none_or(|o| connection.last_ping_received() < o.last_ping_received())
            {
                oldest = Some(connection);
            }
        }

        if let Some(connection) = oldest {
            log::debug!(
                "[{}]: Selecting connection for triggered check: {}",
                self.get_name(),
                connection
            );
        }
        oldest.map(|c| c.id())
    }

    /// `a` precedes `b` in ranking order.
    fn more_pingable<'a>(&self, a: &'a Connection, b: &'a Connection) -> &'a Connection {
        if self.config.get_prioritize_most_likely_candidate_pairs()
            && let Some(c) = most_likely_to_work(a, b)
        {
            return c;
        }
        if let Some(c) = least_recently_pinged(a, b) {
            return c;
        }
        // Nothing pinged yet: keep ranking order.
        a
    }

    pub(crate) fn is_pingable(&self, connection: &Connection, now: Instant) -> bool {
        let remote = connection.remote_candidate();
        if remote.ufrag().is_empty() || remote.password().is_empty() {
            // No way to authenticate a check without the remote credentials.
            return false;
        }

        if connection.state() == CandidatePairState::Failed {
            return false;
        }

        // A never connected connection cannot be written to at all. A writable
        // but disconnected one is reconnecting and needs pings.
        if !connection.connected() && !connection.writable() {
            return false;
        }

        if self.weak() {
            return true;
        }

        if self.is_backup_connection(connection) {
            let interval = self.config.get_backup_connection_ping_interval();
            return connection
                .last_ping_response_received()
                .is_none_or(|last| now >= last + interval);
        }

        connection.active()
    }

    fn is_backup_connection(&self, connection: &Connection) -> bool {
        self.state == IceTransportState::Completed
            && self.best_connection != Some(connection.id())
            && connection.active()
    }

    /// Whether the check should nominate the connection.
    fn use_candidate(&self, connection: &Connection) -> bool {
        let best = self.best_connection();
        match (self.remote_ice_mode, self.ice_role) {
            (IceMode::Full, IceRole::Controlling) => match best {
                None => true,
                Some(best) => {
                    best.id() == connection.id()
                        || !best.writable()
                        || compare_candidates(best, connection) == Ordering::Less
                }
            },
            (IceMode::Lite, _) => best.is_some_and(|b| b.id() == connection.id() && b.writable()),
            _ => false,
        }
    }

    pub(crate) fn ping_connection(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.get(id) else {
            return;
        };
        // USE-CANDIDATE only goes on the wire from the controlling side.
        let use_candidate = self.use_candidate(connection) && self.ice_role == IceRole::Controlling;
        let control = match self.ice_role {
            IceRole::Controlling => Some(IceControl::Controlling(self.tiebreaker)),
            IceRole::Controlled => Some(IceControl::Controlled(self.tiebreaker)),
            IceRole::Unknown => None,
        };
        let request = BindingRequest {
            transaction_id: TransactionId::new(),
            username: format!(
                "{}:{}",
                connection.remote_candidate().ufrag(),
                self.local_params.ufrag
            ),
            priority: Some(connection.prflx_priority()),
            use_candidate,
            control,
        };
        let password = connection.remote_candidate().password().to_owned();
        let transport = connection.transport();

        log::trace!(
            "[{}]: Ping {} use_candidate={} tid={}",
            self.get_name(),
            connection,
            use_candidate,
            request.transaction_id
        );

        let now = self.now;
        self.last_ping_sent = Some(now);
        let transaction_id = request.transaction_id;
        self.with_connection(id, |c| c.ping(now, transaction_id, use_candidate));
        self.queue_command(
            transport,
            Command::Ping {
                connection: id,
                request,
                password,
            },
        );
    }
}

/// Relay to relay pairs are the most likely to get through, UDP relays first.
fn most_likely_to_work<'a>(a: &'a Connection, b: &'a Connection) -> Option<&'a Connection> {
    let a_relay = is_relay_relay(a);
    let b_relay = is_relay_relay(b);
    match (a_relay, b_relay) {
        (true, false) => Some(a),
        (false, true) => Some(b),
        (true, true) => match (is_udp_relay(a), is_udp_relay(b)) {
            (true, false) => Some(a),
            (false, true) => Some(b),
            _ => None,
        },
        (false, false) => None,
    }
}

fn least_recently_pinged<'a>(a: &'a Connection, b: &'a Connection) -> Option<&'a Connection> {
    match a.last_ping_sent().cmp(&b.last_ping_sent()) {
        Ordering::Less => Some(a),
        Ordering::Greater => Some(b),
        Ordering::Equal => None,
    }
}

fn is_relay_relay(connection: &Connection) -> bool {
    connection.local_candidate().candidate_type() == CandidateType::Relay
        && connection.remote_candidate().candidate_type() == CandidateType::Relay
}

fn is_udp_relay(connection: &Connection) -> bool {
    connection.local_candidate().relay_protocol() == Some(TransportProtocol::UDP)
}
