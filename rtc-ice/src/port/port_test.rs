use super::*;
use crate::candidate::candidate_host::CandidateHostConfig;
use crate::candidate::candidate_relay::CandidateRelayConfig;
use crate::candidate::candidate_server_reflexive::CandidateServerReflexiveConfig;
use crate::candidate::{COMPONENT_RTP, CandidateConfig};
use crate::network::AdapterType;
use shared::error::Result;

fn candidate(network: &str, address: &str, port: u16, tcp_type: TcpType) -> Result<Candidate> {
    CandidateHostConfig {
        base_config: CandidateConfig {
            network: network.to_owned(),
            address: address.to_owned(),
            port,
            component: COMPONENT_RTP,
            ..Default::default()
        },
        tcp_type,
    }
    .new_candidate_host()
}

fn lan() -> Network {
    Network::new(1, "eth0", AdapterType::Ethernet)
}

#[test]
fn test_udp_port_prefers_host_candidate() -> Result<()> {
    let srflx = CandidateServerReflexiveConfig {
        base_config: CandidateConfig {
            network: "udp".to_owned(),
            address: "1.2.3.4".to_owned(),
            port: 40000,
            component: COMPONENT_RTP,
            ..Default::default()
        },
        rel_addr: "192.168.1.2".to_owned(),
        rel_port: 5000,
    }
    .new_candidate_server_reflexive()?;
    let port = Port::new(PortId(1), lan(), TransportProtocol::UDP)
        .with_candidate(candidate("udp", "192.168.1.2", 5000, TcpType::Unspecified)?)
        .with_candidate(srflx);

    let remote = candidate("udp", "10.0.0.1", 6000, TcpType::Unspecified)?;
    let local = port.local_candidate_for(&remote, CandidateOrigin::Message);
    assert_eq!(
        local.map(|c| c.candidate_type()),
        Some(CandidateType::Host),
        "connections from a shared socket originate at its host candidate"
    );

    let remote_v6 = candidate("udp", "::1", 6000, TcpType::Unspecified)?;
    assert!(
        port.local_candidate_for(&remote_v6, CandidateOrigin::Message)
            .is_none(),
        "address family must match"
    );

    let remote_tcp = candidate("tcp", "10.0.0.1", 6000, TcpType::Passive)?;
    assert!(
        port.local_candidate_for(&remote_tcp, CandidateOrigin::Message)
            .is_none(),
        "protocol must match"
    );

    assert!(port.has_address("192.168.1.2:5000".parse().unwrap(), TransportProtocol::UDP));
    assert!(!port.has_address("192.168.1.2:5000".parse().unwrap(), TransportProtocol::TCP));

    Ok(())
}

#[test]
fn test_relay_port_uses_relay_candidate() -> Result<()> {
    let relay = CandidateRelayConfig {
        base_config: CandidateConfig {
            network: "udp".to_owned(),
            address: "5.6.7.8".to_owned(),
            port: 3478,
            component: COMPONENT_RTP,
            ..Default::default()
        },
        rel_addr: "1.2.3.4".to_owned(),
        rel_port: 40000,
        ..Default::default()
    }
    .new_candidate_relay()?;
    let port = Port::new(PortId(2), lan(), TransportProtocol::UDP).with_candidate(relay);

    let remote = candidate("udp", "10.0.0.1", 6000, TcpType::Unspecified)?;
    let local = port.local_candidate_for(&remote, CandidateOrigin::Message);
    assert_eq!(
        local.map(|c| c.candidate_type()),
        Some(CandidateType::Relay)
    );

    Ok(())
}

#[test]
fn test_tcp_port_rules() -> Result<()> {
    let port = Port::new(PortId(3), lan(), TransportProtocol::TCP).with_candidate(candidate(
        "tcp",
        "192.168.1.2",
        9,
        TcpType::Passive,
    )?);

    let passive = candidate("tcp", "10.0.0.1", 443, TcpType::Passive)?;
    assert!(
        port.local_candidate_for(&passive, CandidateOrigin::Message)
            .is_some()
    );
    assert!(
        port.local_candidate_for(&passive, CandidateOrigin::OtherPort)
            .is_none(),
        "cannot accept TCP arriving on another port"
    );

    let active = candidate("tcp", "10.0.0.1", 9, TcpType::Active)?;
    assert!(
        port.local_candidate_for(&active, CandidateOrigin::Message)
            .is_none(),
        "active-only remote is never dialed"
    );

    let discard_port = candidate("tcp", "10.0.0.1", 0, TcpType::Unspecified)?;
    assert!(
        port.local_candidate_for(&discard_port, CandidateOrigin::ThisPort)
            .is_none()
    );

    Ok(())
}
