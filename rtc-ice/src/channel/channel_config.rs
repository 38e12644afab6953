use std::sync::Arc;
use std::time::Duration;

use crate::candidate::COMPONENT_RTP;
use crate::network::NetworkCost;
use crate::role::{IceMode, IceRole};

/// Ping interval once the channel is writable and receiving.
pub(crate) const STRONG_PING_INTERVAL: Duration = Duration::from_millis(480);

/// Ping interval while the channel is weak.
pub(crate) const WEAK_PING_INTERVAL: Duration = Duration::from_millis(48);

/// Every active connection is pinged at least this many times at the weak
/// interval before the strong interval applies.
pub(crate) const MIN_PINGS_AT_WEAK_PING_INTERVAL: u32 = 3;

pub(crate) const MIN_CHECK_RECEIVING_INTERVAL: Duration = Duration::from_millis(50);

/// A connection with equal state and candidates must beat the best one's
/// RTT by this much before we switch to it.
pub(crate) const MIN_IMPROVEMENT: Duration = Duration::from_millis(10);

pub(crate) const RECEIVING_TIMEOUT: Duration = Duration::from_millis(2500);

/// Backup connections are pinged at this rate once the channel completed.
pub(crate) const BACKUP_CONNECTION_PING_INTERVAL: Duration = Duration::from_secs(25);

/// The best connection goes un-pinged for at most this long.
pub(crate) const MAX_STRONG_INTERVAL: Duration = Duration::from_millis(900);

/// Runtime tunables. Unset fields keep their current value when applied with
/// [`Channel::set_ice_config`](crate::channel::Channel::set_ice_config).
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct IceConfig {
    /// How long a connection may hear nothing before it stops receiving.
    /// Default: 2.5 seconds
    pub receiving_timeout: Option<Duration>,
    /// Default: 25 seconds
    pub backup_connection_ping_interval: Option<Duration>,
    /// Default: 900 milliseconds
    pub max_strong_interval: Option<Duration>,
    /// Default: 48 milliseconds
    pub weak_ping_interval: Option<Duration>,
    /// Keep gathering after a connection is strongly connected.
    pub gather_continually: Option<bool>,
    /// Ping relay to relay pairs over UDP first.
    pub prioritize_most_likely_candidate_pairs: Option<bool>,
}

impl IceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receiving_timeout(mut self, timeout: Duration) -> Self {
        self.receiving_timeout = Some(timeout);
        self
    }

    pub fn with_backup_connection_ping_interval(mut self, interval: Duration) -> Self {
        self.backup_connection_ping_interval = Some(interval);
        self
    }

    pub fn with_max_strong_interval(mut self, interval: Duration) -> Self {
        self.max_strong_interval = Some(interval);
        self
    }

    pub fn with_weak_ping_interval(mut self, interval: Duration) -> Self {
        self.weak_ping_interval = Some(interval);
        self
    }

    pub fn with_gather_continually(mut self, gather_continually: bool) -> Self {
        self.gather_continually = Some(gather_continually);
        self
    }

    pub fn with_prioritize_most_likely_candidate_pairs(mut self, prioritize: bool) -> Self {
        self.prioritize_most_likely_candidate_pairs = Some(prioritize);
        self
    }

    /// Overwrites the fields that `other` sets.
    pub(crate) fn merge(&mut self, other: &IceConfig) {
        if other.receiving_timeout.is_some() {
            self.receiving_timeout = other.receiving_timeout;
        }
        if other.backup_connection_ping_interval.is_some() {
            self.backup_connection_ping_interval = other.backup_connection_ping_interval;
        }
        if other.max_strong_interval.is_some() {
            self.max_strong_interval = other.max_strong_interval;
        }
        if other.weak_ping_interval.is_some() {
            self.weak_ping_interval = other.weak_ping_interval;
        }
        if other.gather_continually.is_some() {
            self.gather_continually = other.gather_continually;
        }
        if other.prioritize_most_likely_candidate_pairs.is_some() {
            self.prioritize_most_likely_candidate_pairs =
                other.prioritize_most_likely_candidate_pairs;
        }
    }

    pub(crate) fn get_receiving_timeout(&self) -> Duration {
        self.receiving_timeout.unwrap_or(RECEIVING_TIMEOUT)
    }

    pub(crate) fn get_backup_connection_ping_interval(&self) -> Duration {
        self.backup_connection_ping_interval
            .unwrap_or(BACKUP_CONNECTION_PING_INTERVAL)
    }

    pub(crate) fn get_max_strong_interval(&self) -> Duration {
        self.max_strong_interval.unwrap_or(MAX_STRONG_INTERVAL)
    }

    pub(crate) fn get_weak_ping_interval(&self) -> Duration {
        self.weak_ping_interval.unwrap_or(WEAK_PING_INTERVAL)
    }

    pub(crate) fn get_gather_continually(&self) -> bool {
        self.gather_continually.unwrap_or(false)
    }

    pub(crate) fn get_prioritize_most_likely_candidate_pairs(&self) -> bool {
        self.prioritize_most_likely_candidate_pairs.unwrap_or(false)
    }

    /// How often receiving state is re-checked.
    pub(crate) fn check_receiving_interval(&self) -> Duration {
        std::cmp::max(
            MIN_CHECK_RECEIVING_INTERVAL,
            self.get_receiving_timeout() / 10,
        )
    }
}

/// Collects the arguments to [`Channel`](crate::channel::Channel) construction
/// into a single structure, for future-proofness of the interface.
#[derive(Default, Clone)]
pub struct ChannelConfig {
    /// Name of the transport this channel belongs to, used in logs.
    pub transport_name: String,

    /// Defaults to RTP (1) when 0.
    pub component: u16,

    pub ice_role: IceRole,

    /// Random when `None`.
    pub ice_tiebreaker: Option<u64>,

    /// It is used to perform connectivity checks. The values MUST be unguessable, with at least
    /// 128 bits of random number generator output used to generate the password, and at least 24
    /// bits of output to generate the username fragment.
    pub local_ufrag: String,
    /// It is used to perform connectivity checks. The values MUST be unguessable, with at least
    /// 128 bits of random number generator output used to generate the password, and at least 24
    /// bits of output to generate the username fragment.
    pub local_pwd: String,

    /// Lite peers only answer checks, so nomination follows the best writable connection.
    pub remote_ice_mode: IceMode,

    /// Never create connections toward signaled candidates; only answer checks.
    pub incoming_only: bool,

    pub ice_config: IceConfig,

    /// Cost policy per adapter type. [`DefaultNetworkCost`](crate::network::DefaultNetworkCost)
    /// when `None`.
    pub network_cost: Option<Arc<dyn NetworkCost>>,
}

impl ChannelConfig {
    pub(crate) fn get_component(&self) -> u16 {
        if self.component == 0 {
            COMPONENT_RTP
        } else {
            self.component
        }
    }
}
