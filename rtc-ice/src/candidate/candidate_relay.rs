use super::*;

/// The config required to create a new relay candidate.
#[derive(Default)]
pub struct CandidateRelayConfig {
    pub base_config: CandidateConfig,

    pub rel_addr: String,
    pub rel_port: u16,

    /// Transport used to reach the TURN server.
    pub relay_protocol: TransportProtocol,
}

impl CandidateRelayConfig {
    /// Creates a new relay candidate.
    pub fn new_candidate_relay(self) -> Result<Candidate> {
        let related_address = parse_related_address(&self.rel_addr, self.rel_port)?;
        let mut c = self
            .base_config
            .into_candidate(CandidateType::Relay, related_address)?;
        c.relay_protocol = Some(self.relay_protocol);
        Ok(c)
    }
}
