use super::*;
use crate::connection::WriteState;
use crate::port::PortId;

impl Channel {
    fn port_index_for(&self, transport: &TransportContext) -> Option<usize> {
        self.ports
            .iter()
            .position(|p| p.has_address(transport.local_addr, transport.transport_protocol))
    }

    fn port_index(&self, id: PortId) -> Option<usize> {
        self.ports.iter().position(|p| p.id() == id)
    }

    fn handle_binding_success(
        &mut self,
        transport: TransportContext,
        transaction_id: TransactionId,
    ) -> Result<()> {
        let Some(id) = self
            .connections
            .find_by_transaction(&transport, transaction_id)
        else {
            debug!(
                "[{}]: Discarding success response from {} for unknown transaction {}",
                self.get_name(),
                transport.peer_addr,
                transaction_id
            );
            return Ok(());
        };

        let now = self.now;
        let use_candidate = self
            .with_connection(id, |c| c.received_ping_response(now, transaction_id))
            .flatten();
        if use_candidate == Some(true) && self.ice_role == IceRole::Controlling {
            self.with_connection(id, |c| c.set_nominated());
        }
        Ok(())
    }

    fn handle_binding_error(
        &mut self,
        transport: TransportContext,
        transaction_id: TransactionId,
        code: u16,
    ) -> Result<()> {
        let Some(id) = self
            .connections
            .find_by_transaction(&transport, transaction_id)
        else {
            debug!(
                "[{}]: Discarding error response from {} for unknown transaction {}",
                self.get_name(),
                transport.peer_addr,
                transaction_id
            );
            return Ok(());
        };

        match code {
            STUN_ERROR_UNAUTHORIZED
            | STUN_ERROR_UNKNOWN_ATTRIBUTE
            | STUN_ERROR_STALE_CREDENTIALS
            | STUN_ERROR_SERVER_ERROR => {
                // Recoverable; the next ping retries.
                debug!(
                    "[{}]: {} got {} {}, will retry",
                    self.get_name(),
                    id,
                    code,
                    stun_error_reason(code)
                );
            }
            STUN_ERROR_ROLE_CONFLICT => {
                info!("[{}]: {} got a role conflict response", self.get_name(), id);
                self.event_outs.push_back(Event::RoleConflict);
            }
            _ => {
                error!(
                    "[{}]: {} got unrecoverable error {} {}, destroying it",
                    self.get_name(),
                    id,
                    code,
                    stun_error_reason(code)
                );
                self.with_connection(id, |c| c.fail());
                self.destroy_connection(id);
            }
        }
        Ok(())
    }

    fn handle_data(&mut self, transport: TransportContext, payload: BytesMut) -> Result<()> {
        let Some(id) = self.connections.find(&transport).map(|c| c.id()) else {
            warn_discarded(self.get_name(), &transport, "data");
            return Ok(());
        };

        let now = self.now;
        let len = payload.len();
        self.with_connection(id, |c| c.received_data(now, len));
        self.queue_read(transport, payload);
        self.maybe_switch_on_data(id);
        Ok(())
    }

    fn on_port_ready(&mut self, mut port: Port) -> Result<()> {
        if self.port_index(port.id()).is_some() {
            return Err(Error::ErrPortAlreadyExists);
        }

        let cost = self.network_cost.cost(port.network().adapter_type());
        let network_id = port.network().id();
        for candidate in port.candidates.iter_mut() {
            candidate.set_network_cost(cost);
            candidate.set_network_id(network_id);
            candidate.set_ufrag(&self.local_params.ufrag);
        }

        if port.generation() > self.latest_port_generation() {
            // A new gathering round may stop on its own strong connection.
            self.gathering_stopped = false;
        }

        info!(
            "[{}]: Port {} ready on {}",
            self.get_name(),
            port.id(),
            port.network()
        );
        for candidate in port.candidates() {
            self.event_outs
                .push_back(Event::CandidateGathered(candidate.clone()));
        }
        self.ports.push(port);

        let index = self.ports.len() - 1;
        for remote in self.remote_candidates.clone() {
            self.create_connection(index, &remote);
        }
        self.request_sort();
        self.maybe_start_pinging();
        Ok(())
    }

    fn on_candidate_ready(&mut self, id: PortId, mut candidate: Candidate) -> Result<()> {
        let Some(index) = self.port_index(id) else {
            return Err(Error::ErrUnknownPort);
        };

        let port = &self.ports[index];
        candidate.set_network_cost(self.network_cost.cost(port.network().adapter_type()));
        candidate.set_network_id(port.network().id());
        candidate.set_ufrag(&self.local_params.ufrag);

        debug!(
            "[{}]: {} gathered candidate {}",
            self.get_name(),
            id,
            candidate
        );
        self.ports[index].candidates.push(candidate.clone());
        self.event_outs
            .push_back(Event::CandidateGathered(candidate));

        for remote in self.remote_candidates.clone() {
            self.create_connection(index, &remote);
        }
        self.request_sort();
        self.maybe_start_pinging();
        Ok(())
    }

    fn on_port_complete(&mut self, id: PortId) -> Result<()> {
        let Some(index) = self.port_index(id) else {
            return Err(Error::ErrUnknownPort);
        };
        self.ports[index].complete = true;

        if self.ports.iter().all(|p| p.is_complete()) {
            info!("[{}]: All ports finished gathering", self.get_name());
            self.event_outs.push_back(Event::GatheringComplete);
        }
        Ok(())
    }

    fn on_port_destroyed(&mut self, id: PortId) -> Result<()> {
        let Some(index) = self.port_index(id) else {
            return Err(Error::ErrUnknownPort);
        };
        // The port layer tears the sockets down itself, no Destroy commands.
        for connection in self.connections.on_port(id) {
            self.on_connection_destroyed(connection);
        }
        self.ports.remove(index);
        info!(
            "[{}]: Removed port {} ({} remaining)",
            self.get_name(),
            id,
            self.ports.len()
        );
        Ok(())
    }

    fn on_ready_to_send(&mut self, id: ConnectionId) -> Result<()> {
        if !self.connections.contains(id) {
            return Err(Error::ErrUnknownConnection);
        }
        if self.best_connection == Some(id) && self.writable {
            self.event_outs.push_back(Event::ReadyToSend);
        }
        Ok(())
    }

    fn run_tasks(&mut self) {
        while let Some(task) = self.tasks.pop_due(self.now) {
            if self.closed {
                break;
            }
            match task {
                Task::Sort => self.sort_connections(),
                Task::CheckAndPing => self.on_check_and_ping(),
            }
        }
    }
}

impl sansio::Protocol<TransportMessage<InboundMessage>, OutboundPacket, TransportEvent>
    for Channel
{
    type Rout = TaggedBytesMut;
    type Wout = TransportMessage<Command>;
    type Eout = Event;
    type Error = Error;
    type Time = Instant;

    /// Processes decoded traffic received on one of the ports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ErrChannelClosed`] after [`close()`](sansio::Protocol::close),
    /// [`Error::ErrUnhandledStunPacket`] if no port owns the local address, and
    /// [`Error::ErrMismatchUsername`] or [`Error::ErrMissingPriority`] for
    /// binding requests that were answered with an error.
    fn handle_read(&mut self, msg: TransportMessage<InboundMessage>) -> Result<()> {
        self.ensure_open()?;
        self.advance(msg.now);

        let transport = msg.transport;
        let Some(port_index) = self.port_index_for(&transport) else {
            warn!(
                "[{}]: No port owns local address {}",
                self.get_name(),
                transport.local_addr
            );
            return Err(Error::ErrUnhandledStunPacket);
        };

        match msg.message {
            InboundMessage::BindingRequest(request) => {
                self.handle_binding_request(port_index, transport, request)
            }
            InboundMessage::BindingSuccess { transaction_id } => {
                self.handle_binding_success(transport, transaction_id)
            }
            InboundMessage::BindingError {
                transaction_id,
                code,
            } => self.handle_binding_error(transport, transaction_id, code),
            InboundMessage::Data(payload) => self.handle_data(transport, payload),
        }
    }

    /// Application data received on a connection, in arrival order.
    fn poll_read(&mut self) -> Option<Self::Rout> {
        self.read_outs.pop_front()
    }

    /// Sends application data on the selected connection.
    fn handle_write(&mut self, msg: OutboundPacket) -> Result<()> {
        self.ensure_open()?;

        let Some(best) = self.best_connection() else {
            return Err(Error::ErrNoBestConnection);
        };
        let id = best.id();
        let transport = best.transport();
        let write_state = best.write_state();

        if matches!(write_state, WriteState::Init | WriteState::WriteTimeout) {
            return Err(Error::ErrConnectionNotWritable);
        }

        let len = msg.payload.len();
        self.with_connection(id, |c| c.sent_data(len));
        self.queue_command(
            transport,
            Command::Data {
                connection: id,
                packet_id: msg.packet_id,
                payload: msg.payload,
            },
        );
        self.last_sent_packet_id = Some(msg.packet_id);
        Ok(())
    }

    /// Commands for the port layer: checks, responses, data and teardown.
    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_outs.pop_front()
    }

    /// Applies a lifecycle notification from the gathering layer.
    fn handle_event(&mut self, evt: TransportEvent) -> Result<()> {
        self.ensure_open()?;

        match evt {
            TransportEvent::PortReady(port) => self.on_port_ready(port),
            TransportEvent::CandidateReady { port, candidate } => {
                self.on_candidate_ready(port, candidate)
            }
            TransportEvent::PortComplete(port) => self.on_port_complete(port),
            TransportEvent::PortDestroyed(port) => self.on_port_destroyed(port),
            TransportEvent::ConnectionDestroyed(id) => {
                if self.on_connection_destroyed(id) {
                    Ok(())
                } else {
                    Err(Error::ErrUnknownConnection)
                }
            }
            TransportEvent::ConnectionStateChanged {
                connection,
                connected,
            } => self
                .with_connection(connection, |c| c.set_connected(connected))
                .ok_or(Error::ErrUnknownConnection),
            TransportEvent::ReadyToSend(id) => self.on_ready_to_send(id),
        }
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_outs.pop_front()
    }

    /// Runs every scheduled task that is due at `now`.
    fn handle_timeout(&mut self, now: Self::Time) -> Result<()> {
        self.ensure_open()?;
        self.advance(now);
        self.run_tasks();
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if self.closed {
            return None;
        }
        self.tasks.next_deadline()
    }

    /// Destroys every connection and stops all scheduled work. The queued
    /// [`Command::Destroy`]s stay available from `poll_write`, and a final
    /// [`Event::SelectedCandidatePairChange`] reports the lost selection.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        info!("[{}]: Closing channel", self.get_name());
        self.write_outs.clear();
        self.read_outs.clear();
        self.destroy_all();
        self.tasks.clear();
        self.sort_dirty = false;
        self.closed = true;
        Ok(())
    }
}
