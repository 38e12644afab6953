use super::*;

/// The config required to create a new host candidate.
#[derive(Default)]
pub struct CandidateHostConfig {
    pub base_config: CandidateConfig,

    pub tcp_type: TcpType,
}

impl CandidateHostConfig {
    /// Creates a new host candidate.
    pub fn new_candidate_host(self) -> Result<Candidate> {
        let mut c = self.base_config.into_candidate(CandidateType::Host, None)?;
        c.tcp_type = self.tcp_type;
        Ok(c)
    }
}
