use super::*;
use shared::error::Result;

#[test]
fn test_transport_state_transitions() -> Result<()> {
    use IceTransportState::*;

    let tests = vec![
        (Init, Connecting, true),
        (Init, Completed, true),
        (Init, Failed, false),
        (Connecting, Completed, true),
        (Connecting, Failed, true),
        (Connecting, Init, false),
        (Completed, Connecting, true),
        (Completed, Failed, true),
        (Failed, Connecting, true),
        (Failed, Completed, true),
        (Failed, Init, false),
    ];

    for (from, to, want) in tests {
        assert_eq!(
            from.can_transition_to(to),
            want,
            "{from} -> {to} expected legal={want}"
        );
    }

    Ok(())
}
