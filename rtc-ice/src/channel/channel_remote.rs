use super::*;
use crate::candidate::CandidateConfig;
use crate::candidate::candidate_peer_reflexive::CandidatePeerReflexiveConfig;
use crate::port::CandidateOrigin;

impl Channel {
    /// Sets the credentials of the remote agent. A new pair starts a new
    /// remote generation; candidates and connections learned before the
    /// password was known are completed with it.
    pub fn set_remote_credentials(&mut self, ufrag: &str, pwd: &str) -> Result<()> {
        self.ensure_open()?;
        if ufrag.is_empty() {
            return Err(Error::ErrRemoteUfragEmpty);
        } else if pwd.is_empty() {
            return Err(Error::ErrRemotePwdEmpty);
        }

        let params = IceParameters::new(ufrag, pwd);
        if self.remote_params.last() != Some(&params) {
            self.remote_params.push(params);
        }

        for candidate in self.remote_candidates.iter_mut() {
            if candidate.ufrag() == ufrag && candidate.password().is_empty() {
                candidate.set_password(pwd);
            }
        }

        let generation = self.remote_ice_generation();
        for connection in self.connections.iter_mut() {
            connection.maybe_set_remote_ice_credentials(ufrag, pwd, generation);
        }

        // A generation change may reorder connections.
        self.request_sort();
        self.maybe_start_pinging();
        Ok(())
    }

    /// Adds a candidate signaled by the peer and pairs it with every
    /// compatible local port.
    pub fn add_remote_candidate(&mut self, candidate: Candidate) -> Result<()> {
        self.ensure_open()?;

        let generation = self.remote_candidate_generation(&candidate);
        if generation < self.remote_ice_generation() {
            warn!(
                "[{}]: Dropping a remote candidate because its ufrag {} indicates it was for a previous generation.",
                self.get_name(),
                candidate.ufrag()
            );
            return Ok(());
        }

        let mut candidate = candidate;
        candidate.set_generation(generation);
        if let Some(current) = self.remote_params.last() {
            if candidate.ufrag().is_empty() {
                candidate.set_ufrag(&current.ufrag);
            }
            if candidate.ufrag() == current.ufrag {
                if candidate.password().is_empty() {
                    candidate.set_password(&current.pwd);
                }
            } else {
                // The password comes with the next generation's credentials.
                warn!(
                    "[{}]: A remote candidate arrives with an unknown ufrag: {}",
                    self.get_name(),
                    candidate.ufrag()
                );
            }
        }

        for connection in self.connections.iter_mut() {
            connection.maybe_update_peer_reflexive_candidate(&candidate);
        }

        self.create_connections(&candidate);
        self.request_sort();
        self.maybe_start_pinging();
        Ok(())
    }

    /// Forgets remote candidates matching `candidates` and destroys their connections.
    pub fn remove_remote_candidates(&mut self, candidates: &[Candidate]) -> Result<()> {
        self.ensure_open()?;

        for removed in candidates {
            let before = self.remote_candidates.len();
            self.remote_candidates
                .retain(|c| !removed.matches_for_removal(c));
            if self.remote_candidates.len() != before {
                info!(
                    "[{}]: Removed remote candidate {}",
                    self.get_name(),
                    removed
                );
            }

            let doomed: Vec<ConnectionId> = self
                .connections
                .iter()
                .filter(|c| removed.matches_for_removal(c.remote_candidate()))
                .map(|c| c.id())
                .collect();
            for id in doomed {
                self.destroy_connection(id);
            }
        }
        Ok(())
    }

    pub(crate) fn remote_ice_generation(&self) -> u32 {
        self.remote_params.len().saturating_sub(1) as u32
    }

    /// The generation whose credentials carry `ufrag`, newest first.
    pub(crate) fn find_remote_ice_from_ufrag(&self, ufrag: &str) -> Option<(u32, &IceParameters)> {
        self.remote_params
            .iter()
            .enumerate()
            .rev()
            .find(|(_, params)| params.ufrag == ufrag)
            .map(|(generation, params)| (generation as u32, params))
    }

    fn remote_candidate_generation(&self, candidate: &Candidate) -> u32 {
        if !candidate.ufrag().is_empty() {
            // An unknown ufrag belongs to the next generation.
            return self
                .find_remote_ice_from_ufrag(candidate.ufrag())
                .map(|(generation, _)| generation)
                .unwrap_or(self.remote_params.len() as u32);
        }
        if candidate.generation() > 0 {
            return candidate.generation();
        }
        self.remote_ice_generation()
    }

    fn is_duplicate_remote_candidate(&self, candidate: &Candidate) -> bool {
        self.remote_candidates
            .iter()
            .any(|c| c.is_equivalent(candidate))
    }

    fn create_connections(&mut self, remote: &Candidate) {
        // Already seen in this generation: we either have its connections or
        // pruned them, and re-creating them would only churn.
        if self.is_duplicate_remote_candidate(remote) {
            debug!("[{}]: Duplicate candidate: {}", self.get_name(), remote);
            return;
        }

        for index in (0..self.ports.len()).rev() {
            self.create_connection(index, remote);
        }

        self.remember_remote_candidate(remote.clone());
    }

    /// Pairs a signaled candidate with one port.
    pub(crate) fn create_connection(&mut self, port_index: usize, remote: &Candidate) -> bool {
        let Some(port) = self.ports.get(port_index) else {
            return false;
        };
        if port.protocol() != remote.protocol() {
            return false;
        }

        // A connection to the same address is only replaced by a newer generation.
        if let Some(existing) =
            self.connections
                .find_on_port(port.id(), remote.address(), remote.protocol())
            && existing.remote_candidate().generation() >= remote.generation()
        {
            if !remote.is_equivalent(existing.remote_candidate()) {
                info!(
                    "[{}]: Attempt to change a remote candidate. Existing remote candidate: {} New remote candidate: {}",
                    self.get_name(),
                    existing.remote_candidate(),
                    remote
                );
            }
            return false;
        }

        if self.incoming_only {
            return false;
        }

        let Some(local) = port
            .local_candidate_for(remote, CandidateOrigin::Message)
            .cloned()
        else {
            return false;
        };
        self.new_connection(port_index, local, remote.clone())
            .is_some()
    }

    fn new_connection(
        &mut self,
        port_index: usize,
        local: Candidate,
        remote: Candidate,
    ) -> Option<ConnectionId> {
        let port = self.ports.get(port_index)?;
        let id = self.connections.next_id();
        let connection = Connection::new(
            id,
            port,
            local,
            remote,
            self.ice_role,
            self.config.get_receiving_timeout(),
            self.now,
        );
        self.add_connection(connection);
        Some(id)
    }

    fn remember_remote_candidate(&mut self, candidate: Candidate) {
        // A newer generation makes the older candidates useless.
        self.remote_candidates
            .retain(|c| c.generation() >= candidate.generation());

        if self.is_duplicate_remote_candidate(&candidate) {
            debug!("[{}]: Duplicate candidate: {}", self.get_name(), candidate);
            return;
        }

        self.remote_candidates.push(candidate);
    }

    /// Handles an authenticated binding request that arrived on `port_index`.
    pub(crate) fn handle_binding_request(
        &mut self,
        port_index: usize,
        transport: TransportContext,
        request: BindingRequest,
    ) -> Result<()> {
        let Some((local_ufrag, remote_ufrag)) = request.ufrags() else {
            warn!(
                "[{}]: Binding request without a valid USERNAME from {}",
                self.get_name(),
                transport.peer_addr
            );
            self.send_binding_error(transport, request.transaction_id, STUN_ERROR_BAD_REQUEST);
            return Err(Error::ErrMismatchUsername);
        };
        if local_ufrag != self.local_params.ufrag {
            warn!(
                "[{}]: Binding request for ufrag {} from {}, expected {}",
                self.get_name(),
                local_ufrag,
                transport.peer_addr,
                self.local_params.ufrag
            );
            self.send_binding_error(transport, request.transaction_id, STUN_ERROR_UNAUTHORIZED);
            return Err(Error::ErrMismatchUsername);
        }
        let remote_ufrag = remote_ufrag.to_owned();

        if !self.check_role_conflict(&transport, &request, &remote_ufrag) {
            info!(
                "[{}]: Received conflicting role from the peer.",
                self.get_name()
            );
            return Ok(());
        }

        if let Some(id) = self.connections.find(&transport).map(|c| c.id()) {
            self.handle_binding_request_on(id, transport, &request);
            return Ok(());
        }

        self.on_unknown_address(port_index, transport, request, remote_ufrag)
    }

    fn handle_binding_request_on(
        &mut self,
        id: ConnectionId,
        transport: TransportContext,
        request: &BindingRequest,
    ) {
        let now = self.now;
        self.with_connection(id, |c| c.received_ping(now));
        self.queue_command(
            transport,
            Command::BindingSuccess {
                transaction_id: request.transaction_id,
            },
        );

        if self.ice_role == IceRole::Controlled && request.use_candidate {
            self.with_connection(id, |c| c.set_nominated());
            self.on_nominated(id);
        }
    }

    /// RFC 8445 7.3.1.1. Returns false when the request must be dropped.
    fn check_role_conflict(
        &mut self,
        transport: &TransportContext,
        request: &BindingRequest,
        remote_ufrag: &str,
    ) -> bool {
        let Some(control) = request.control else {
            return true;
        };
        let remote_tiebreaker = match control {
            IceControl::Controlling(tiebreaker) | IceControl::Controlled(tiebreaker) => tiebreaker,
        };
        if remote_ufrag == self.local_params.ufrag && remote_tiebreaker == self.tiebreaker {
            // Our own check looped back.
            return true;
        }

        let we_yield = match (self.ice_role, control) {
            (IceRole::Controlling, IceControl::Controlling(_)) => {
                remote_tiebreaker >= self.tiebreaker
            }
            (IceRole::Controlled, IceControl::Controlled(_)) => remote_tiebreaker < self.tiebreaker,
            _ => return true,
        };

        if we_yield {
            info!(
                "[{}]: Role conflict with {}, signaling it",
                self.get_name(),
                transport.peer_addr
            );
            self.event_outs.push_back(Event::RoleConflict);
            true
        } else {
            self.send_binding_error(*transport, request.transaction_id, STUN_ERROR_ROLE_CONFLICT);
            false
        }
    }

    /// A valid check from an address no connection knows: learn a peer
    /// reflexive candidate and pair it with the receiving port.
    fn on_unknown_address(
        &mut self,
        port_index: usize,
        transport: TransportContext,
        request: BindingRequest,
        remote_ufrag: String,
    ) -> Result<()> {
        let signaled = self
            .remote_candidates
            .iter()
            .find(|c| {
                c.ufrag() == remote_ufrag
                    && c.address() == transport.peer_addr
                    && c.protocol() == transport.transport_protocol
            })
            .cloned();

        // The request may arrive after the credentials but before the candidate.
        let (generation, password) = self
            .find_remote_ice_from_ufrag(&remote_ufrag)
            .map(|(generation, params)| (generation, params.pwd.clone()))
            .unwrap_or_default();

        let is_new = signaled.is_none();
        let remote = match signaled {
            Some(candidate) => candidate,
            None => {
                let Some(priority) = request.priority else {
                    warn!(
                        "[{}]: No PRIORITY in binding request from {}",
                        self.get_name(),
                        transport.peer_addr
                    );
                    self.send_binding_error(
                        transport,
                        request.transaction_id,
                        STUN_ERROR_BAD_REQUEST,
                    );
                    return Err(Error::ErrMissingPriority);
                };
                CandidatePeerReflexiveConfig {
                    base_config: CandidateConfig {
                        network: transport.transport_protocol.to_string(),
                        address: transport.peer_addr.ip().to_string(),
                        port: transport.peer_addr.port(),
                        component: self.component,
                        priority,
                        generation,
                        ufrag: remote_ufrag,
                        password,
                        ..Default::default()
                    },
                    ..Default::default()
                }
                .new_candidate_peer_reflexive()?
            }
        };

        let local = self.ports.get(port_index).and_then(|port| {
            port.candidates()
                .iter()
                .find(|c| c.address() == transport.local_addr)
                .or_else(|| port.local_candidate_for(&remote, CandidateOrigin::ThisPort))
                .cloned()
        });
        let id = match local {
            Some(local) => self.new_connection(port_index, local, remote.clone()),
            None => None,
        };
        let Some(id) = id else {
            warn!(
                "[{}]: Cannot create a connection to {} on the receiving port",
                self.get_name(),
                remote
            );
            self.send_binding_error(transport, request.transaction_id, STUN_ERROR_SERVER_ERROR);
            return Ok(());
        };

        let origin = if is_new {
            "peer reflexive"
        } else {
            "resurrected"
        };
        info!(
            "[{}]: Adding connection from {} candidate: {}",
            self.get_name(),
            origin,
            remote
        );
        self.handle_binding_request_on(id, transport, &request);
        self.request_sort();
        Ok(())
    }

    pub(crate) fn send_binding_error(
        &mut self,
        transport: TransportContext,
        transaction_id: TransactionId,
        code: u16,
    ) {
        self.queue_command(
            transport,
            Command::BindingError {
                transaction_id,
                code,
                reason: stun_error_reason(code).to_owned(),
            },
        );
    }
}
