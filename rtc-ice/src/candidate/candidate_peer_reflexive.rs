use super::*;

/// The config required to create a new peer reflexive candidate.
#[derive(Default)]
pub struct CandidatePeerReflexiveConfig {
    pub base_config: CandidateConfig,

    pub rel_addr: String,
    pub rel_port: u16,
}

impl CandidatePeerReflexiveConfig {
    /// Creates a new peer reflexive candidate.
    ///
    /// RFC 8445 7.3.1.3: the foundation of a peer reflexive remote candidate is
    /// an arbitrary value distinct from every other remote candidate, so an
    /// empty foundation is derived from the candidate id.
    pub fn new_candidate_peer_reflexive(self) -> Result<Candidate> {
        let related_address = parse_related_address(&self.rel_addr, self.rel_port)?;
        let mut c = self
            .base_config
            .into_candidate(CandidateType::PeerReflexive, related_address)?;
        if c.foundation_override.is_empty() {
            let checksum = Crc::<u32>::new(&CRC_32_ISCSI).checksum(c.id.as_bytes());
            c.foundation_override = format!("{checksum}");
        }
        Ok(c)
    }
}
