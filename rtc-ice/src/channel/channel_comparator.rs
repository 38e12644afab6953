use std::cmp::Ordering;

use crate::connection::{Connection, WriteState};

// Every comparison here answers "is `a` better than `b`": Greater means `a`
// wins. Sorting best-first therefore compares `b` against `a`.

/// Ranks two connections by how usable they currently are.
pub(crate) fn compare_states(a: &Connection, b: &Connection) -> Ordering {
    // Lower write state values are better.
    match b.write_state().cmp(&a.write_state()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // A receiving connection beats a non-receiving one of higher priority.
    match a.receiving().cmp(&b.receiving()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // A TCP connection that is reconnecting keeps its writable state but
    // must lose to a fresh writable one.
    if a.write_state() == WriteState::Writable && b.write_state() == WriteState::Writable {
        return a.connected().cmp(&b.connected());
    }

    Ordering::Equal
}

/// Ranks two connections by their static preference.
pub(crate) fn compare_candidates(a: &Connection, b: &Connection) -> Ordering {
    // Cheaper networks win.
    match b.network_cost().cmp(&a.network_cost()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    match a.priority().cmp(&b.priority()) {
        Ordering::Equal => {}
        ord => return ord,
    }

    // Newer generations win.
    a.generation().cmp(&b.generation())
}

/// Full ranking used for sorting: state, then candidates, then lower RTT.
pub(crate) fn compare_connections(a: &Connection, b: &Connection) -> Ordering {
    compare_states(a, b)
        .then_with(|| compare_candidates(a, b))
        .then_with(|| b.rtt().cmp(&a.rtt()))
}
