//! Two channels checking connectivity against each other over a lossless
//! in-memory network, from candidate exchange to a completed transport.

use bytes::BytesMut;
use rtc_ice::candidate::candidate_host::CandidateHostConfig;
use rtc_ice::candidate::candidate_relay::CandidateRelayConfig;
use rtc_ice::candidate::{Candidate, CandidateConfig, CandidateType};
use rtc_ice::*;
use sansio::Protocol;
use shared::error::Result;
use shared::{TransportContext, TransportMessage, TransportProtocol};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

fn candidate_config(address: &str, port: u16) -> CandidateConfig {
    CandidateConfig {
        network: "udp".to_owned(),
        address: address.to_owned(),
        port,
        component: 1,
        ..Default::default()
    }
}

/// A host port and a UDP TURN port, both on the same network.
fn ports(host: &str, relay: &str) -> Result<Vec<Port>> {
    let network = Network::new(1, "eth0", AdapterType::Ethernet);
    let host_candidate = CandidateHostConfig {
        base_config: candidate_config(host, 5000),
        ..Default::default()
    }
    .new_candidate_host()?;
    let relay_candidate = CandidateRelayConfig {
        base_config: candidate_config(relay, 3478),
        rel_addr: host.to_owned(),
        rel_port: 5001,
        relay_protocol: TransportProtocol::UDP,
    }
    .new_candidate_relay()?;

    Ok(vec![
        Port::new(PortId(1), network.clone(), TransportProtocol::UDP)
            .with_candidate(host_candidate),
        Port::new(PortId(2), network, TransportProtocol::UDP)
            .with_candidate(relay_candidate),
    ])
}

struct Peer {
    channel: Channel,
    states: Vec<IceTransportState>,
    pings: Vec<(SocketAddr, SocketAddr)>,
    gathered: Vec<Candidate>,
}

impl Peer {
    fn new(ice_role: IceRole, host: &str, relay: &str, now: Instant) -> Result<Self> {
        let config = ChannelConfig {
            transport_name: "data".to_owned(),
            ice_role,
            ice_config: IceConfig::new().with_prioritize_most_likely_candidate_pairs(true),
            ..Default::default()
        };
        let mut channel = Channel::new(config, now)?;
        for port in ports(host, relay)? {
            channel.handle_event(TransportEvent::PortReady(port))?;
        }

        let mut peer = Self {
            channel,
            states: vec![],
            pings: vec![],
            gathered: vec![],
        };
        peer.poll_events();
        Ok(peer)
    }

    fn poll_events(&mut self) {
        while let Some(event) = self.channel.poll_event() {
            match event {
                Event::StateChange(state) => self.states.push(state),
                Event::CandidateGathered(candidate) => self.gathered.push(candidate),
                _ => {}
            }
        }
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        while self.channel.poll_timeout().is_some_and(|deadline| deadline <= now) {
            self.channel.handle_timeout(now)?;
        }
        self.poll_events();
        Ok(())
    }

    fn best_pair(&self) -> Option<(CandidateType, CandidateType)> {
        self.channel.best_connection().map(|c| {
            (
                c.local_candidate().candidate_type(),
                c.remote_candidate().candidate_type(),
            )
        })
    }
}

/// Turns a command of `from` into the message `to` receives.
fn deliver(
    from: &mut Peer,
    to: &mut Peer,
    msg: TransportMessage<Command>,
    now: Instant,
) -> Result<()> {
    let transport = TransportContext {
        local_addr: msg.transport.peer_addr,
        peer_addr: msg.transport.local_addr,
        transport_protocol: msg.transport.transport_protocol,
    };
    let message = match msg.message {
        Command::Ping { request, .. } => {
            from.pings
                .push((msg.transport.local_addr, msg.transport.peer_addr));
            InboundMessage::BindingRequest(request)
        }
        Command::BindingSuccess { transaction_id } => {
            InboundMessage::BindingSuccess { transaction_id }
        }
        Command::BindingError {
            transaction_id,
            code,
            ..
        } => InboundMessage::BindingError {
            transaction_id,
            code,
        },
        Command::Data { payload, .. } => InboundMessage::Data(payload),
        Command::Destroy(_) => return Ok(()),
    };
    to.channel.handle_read(TransportMessage {
        now,
        transport,
        message,
    })
}

/// Moves commands between the peers until both go quiet.
fn route(a: &mut Peer, b: &mut Peer, now: Instant) -> Result<()> {
    loop {
        let mut moved = false;
        while let Some(msg) = a.channel.poll_write() {
            deliver(a, b, msg, now)?;
            moved = true;
        }
        while let Some(msg) = b.channel.poll_write() {
            deliver(b, a, msg, now)?;
            moved = true;
        }
        if !moved {
            break;
        }
    }
    a.poll_events();
    b.poll_events();
    Ok(())
}

fn run(a: &mut Peer, b: &mut Peer, start: Instant, until: Duration) -> Result<Instant> {
    let mut now = start;
    while now < start + until {
        a.handle_timeout(now)?;
        route(a, b, now)?;
        b.handle_timeout(now)?;
        route(a, b, now)?;
        now += Duration::from_millis(10);
    }
    Ok(now)
}

fn exchange_candidates(from: &mut Peer, to: &mut Peer) -> Result<()> {
    let credentials = from.channel.local_credentials().clone();
    to.channel
        .set_remote_credentials(&credentials.ufrag, &credentials.pwd)?;
    for candidate in from.gathered.drain(..) {
        to.channel.add_remote_candidate(candidate)?;
    }
    Ok(())
}

#[test]
fn test_channels_connect_over_host_pair() -> Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let start = Instant::now();
    let mut controlling = Peer::new(IceRole::Controlling, "192.168.1.1", "1.1.1.1", start)?;
    let mut controlled = Peer::new(IceRole::Controlled, "192.168.2.2", "2.2.2.2", start)?;
    assert_eq!(controlling.gathered.len(), 2);

    exchange_candidates(&mut controlling, &mut controlled)?;
    exchange_candidates(&mut controlled, &mut controlling)?;
    assert_eq!(controlling.channel.connections().count(), 4);
    assert_eq!(controlled.channel.connections().count(), 4);

    controlling.handle_timeout(start)?;
    controlled.handle_timeout(start)?;
    assert_eq!(controlling.channel.state(), IceTransportState::Connecting);
    assert_eq!(controlled.channel.state(), IceTransportState::Connecting);

    controlling.channel.connect()?;
    controlled.channel.connect()?;
    run(&mut controlling, &mut controlled, start, Duration::from_secs(3))?;

    // Relay to relay goes first when prioritizing the most likely pairs.
    let relay_relay = (
        "1.1.1.1:3478".parse::<SocketAddr>().unwrap(),
        "2.2.2.2:3478".parse::<SocketAddr>().unwrap(),
    );
    assert_eq!(controlling.pings.first(), Some(&relay_relay));

    for peer in [&controlling, &controlled] {
        assert_eq!(
            peer.states,
            vec![IceTransportState::Connecting, IceTransportState::Completed]
        );
        assert_eq!(
            peer.best_pair(),
            Some((CandidateType::Host, CandidateType::Host))
        );
        assert!(peer.channel.writable());
        assert!(peer.channel.receiving());
        assert!(peer.channel.best_connection().is_some_and(|c| c.nominated()));
        assert_eq!(
            peer.channel.connections().filter(|c| !c.pruned()).count(),
            1
        );
    }

    Ok(())
}

#[test]
fn test_data_flows_on_selected_pair() -> Result<()> {
    let start = Instant::now();
    let mut controlling = Peer::new(IceRole::Controlling, "192.168.1.1", "1.1.1.1", start)?;
    let mut controlled = Peer::new(IceRole::Controlled, "192.168.2.2", "2.2.2.2", start)?;
    exchange_candidates(&mut controlling, &mut controlled)?;
    exchange_candidates(&mut controlled, &mut controlling)?;
    controlling.channel.connect()?;
    controlled.channel.connect()?;
    let now = run(&mut controlling, &mut controlled, start, Duration::from_secs(2))?;

    controlling.channel.handle_write(OutboundPacket {
        packet_id: 1,
        payload: BytesMut::from(&b"ping over ice"[..]),
    })?;
    route(&mut controlling, &mut controlled, now)?;

    let received = controlled.channel.poll_read().unwrap();
    assert_eq!(&received.message[..], b"ping over ice");
    assert_eq!(received.transport.peer_addr.to_string(), "192.168.1.1:5000");

    let stats = controlling.channel.get_stats();
    let best = stats.iter().find(|s| s.best).unwrap();
    assert_eq!(best.bytes_sent, 13);
    assert!(best.nominated);

    Ok(())
}
