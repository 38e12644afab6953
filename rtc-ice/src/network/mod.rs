#[cfg(test)]
mod network_test;

use serde::Serialize;
use std::fmt;

/// Identifier of a local network interface, as carried in `network-id`.
pub type NetworkId = u16;

pub const NETWORK_COST_MIN: u16 = 0;
pub const NETWORK_COST_LOW: u16 = 10;
pub const NETWORK_COST_UNKNOWN: u16 = 50;
pub const NETWORK_COST_HIGH: u16 = 900;
pub const NETWORK_COST_MAX: u16 = 999;

/// Kind of link a local network sits on.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum AdapterType {
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "ethernet")]
    Ethernet,
    #[serde(rename = "wifi")]
    Wifi,
    #[serde(rename = "cellular")]
    Cellular,
    #[serde(rename = "vpn")]
    Vpn,
    #[serde(rename = "loopback")]
    Loopback,
}

impl fmt::Display for AdapterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            AdapterType::Unknown => "unknown",
            AdapterType::Ethernet => "ethernet",
            AdapterType::Wifi => "wifi",
            AdapterType::Cellular => "cellular",
            AdapterType::Vpn => "vpn",
            AdapterType::Loopback => "loopback",
        };
        write!(f, "{s}")
    }
}

/// Maps a link type to the cost used when ranking candidate pairs.
/// Smaller is cheaper.
pub trait NetworkCost: Send + Sync {
    fn cost(&self, adapter_type: AdapterType) -> u16;
}

/// Wired and loopback links are free, Wi-Fi and VPN cheap, cellular expensive.
#[derive(Default, Debug, Copy, Clone)]
pub struct DefaultNetworkCost;

impl NetworkCost for DefaultNetworkCost {
    fn cost(&self, adapter_type: AdapterType) -> u16 {
        match adapter_type {
            AdapterType::Ethernet | AdapterType::Loopback => NETWORK_COST_MIN,
            AdapterType::Wifi | AdapterType::Vpn => NETWORK_COST_LOW,
            AdapterType::Cellular => NETWORK_COST_HIGH,
            AdapterType::Unknown => NETWORK_COST_UNKNOWN,
        }
    }
}

impl<F> NetworkCost for F
where
    F: Fn(AdapterType) -> u16 + Send + Sync,
{
    fn cost(&self, adapter_type: AdapterType) -> u16 {
        self(adapter_type)
    }
}

/// A local network interface that ports are bound on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Network {
    pub(crate) id: NetworkId,
    pub(crate) name: String,
    pub(crate) adapter_type: AdapterType,
}

impl Network {
    pub fn new(id: NetworkId, name: &str, adapter_type: AdapterType) -> Self {
        Self {
            id,
            name: name.to_owned(),
            adapter_type,
        }
    }

    pub fn id(&self) -> NetworkId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn adapter_type(&self) -> AdapterType {
        self.adapter_type
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Net[{}:{}/{}]", self.name, self.id, self.adapter_type)
    }
}
