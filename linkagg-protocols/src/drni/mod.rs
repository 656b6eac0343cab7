//! Distributed Relay Control Protocol machines (802.1AX-2014 clause 9)
//!
//! A portal stretches one LAG across up to three chassis. Per Intra-Portal
//! Port this module runs the DRCP Receive, Periodic, and Transmit machines;
//! portal-wide it runs the DRNI Gateway and Aggregator machines that keep
//! the conversation-ID maps agreed between portal systems. The relay task
//! owns the portal state and its IPP registry; IPP tasks own their
//! neighbour records and talk to the relay with typed messages only.

pub mod aggmachine;
pub mod gateway;
pub mod ipp;
pub mod periodic;
pub mod portal;
pub mod relay;
pub mod rxm;
pub mod txm;

pub use aggmachine::{AggregatorMachine, AmState};
pub use gateway::{GatewayMachine, GmState};
pub use ipp::{Ipp, IppCounters, IppStatic};
pub use periodic::{DrcpPeriodicMachine, DrcpPeriodicState};
pub use portal::{IppEvent, IppSnapshot, Portal, RelayEvent, RelaySnapshot};
pub use relay::{DistributedRelay, NeighborRecord, PortalSystemState};
pub use rxm::DrcpRxMachine;
pub use txm::DrcpTxMachine;

/// Timer constants of 802.1AX clause 9.4.10, shaped like the LACP ones
pub mod constants {
    use std::time::Duration;

    pub const DRCP_FAST_PERIODIC_TIME: Duration = Duration::from_secs(1);
    pub const DRCP_SLOW_PERIODIC_TIME: Duration = Duration::from_secs(30);
    pub const DRCP_SHORT_TIMEOUT_TIME: Duration = Duration::from_secs(3);
    pub const DRCP_LONG_TIMEOUT_TIME: Duration = Duration::from_secs(90);
}

/// Side effects the per-IPP machines ask their task to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrniAction {
    /// Gateway conversation state must be recomputed portal-wide
    GatewayUpdate,
    /// Port conversation state must be recomputed portal-wide
    PortUpdate,
    /// The neighbour record changed; the relay needs the new copy
    NeighborChanged,
    /// The neighbour timed out; its portal state must be zeroed
    NeighborGone,
    /// The Transmit machine should emit a DRCPDU
    Ntt,
}
