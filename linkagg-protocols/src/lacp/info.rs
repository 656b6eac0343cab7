//! Port information comparison helpers
//!
//! Actor and Partner information blocks reuse the wire-layout struct from
//! `linkagg-packet`; the comparisons here define which differences matter to
//! the Receive machine and to Selection.

use linkagg_core::LacpMode;
use linkagg_packet::{LacpState, PduPortInfo};

/// True when `a` and `b` agree on port number, port priority, system id,
/// system priority, key, and every state bit named in `state_mask`
pub fn info_equal(a: &PduPortInfo, b: &PduPortInfo, state_mask: u8) -> bool {
    a.port == b.port
        && a.port_priority == b.port_priority
        && a.system == b.system
        && a.key == b.key
        && (a.state.0 & state_mask) == (b.state.0 & state_mask)
}

/// The 6-tuple comparison used by `recordPdu`, `updateSelected`, and
/// Selection: identity fields plus the Aggregation bit
pub fn same_partner(a: &PduPortInfo, b: &PduPortInfo) -> bool {
    info_equal(a, b, LacpState::AGGREGATION)
}

/// Operational LACP mode derived from a state vector
pub fn oper_mode(state: LacpState, lacp_enabled: bool) -> LacpMode {
    if !lacp_enabled {
        LacpMode::On
    } else if state.activity() {
        LacpMode::Active
    } else {
        LacpMode::Passive
    }
}
