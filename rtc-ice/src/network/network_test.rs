use super::*;
use shared::error::Result;

#[test]
fn test_default_network_cost() -> Result<()> {
    let cost = DefaultNetworkCost;

    assert_eq!(cost.cost(AdapterType::Ethernet), 0);
    assert_eq!(cost.cost(AdapterType::Loopback), 0);
    assert_eq!(cost.cost(AdapterType::Wifi), 10);
    assert_eq!(cost.cost(AdapterType::Vpn), 10);
    assert_eq!(cost.cost(AdapterType::Unknown), 50);
    assert_eq!(cost.cost(AdapterType::Cellular), 900);

    Ok(())
}

#[test]
fn test_closure_network_cost() -> Result<()> {
    let flat = |_: AdapterType| 7u16;
    let cost: &dyn NetworkCost = &flat;

    assert_eq!(cost.cost(AdapterType::Cellular), 7);

    Ok(())
}
