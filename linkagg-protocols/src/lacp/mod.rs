//! LACP per-port state machines (802.1AX-2014 clause 6)
//!
//! Six machines cooperate per aggregation port: Receive, Periodic Transmit,
//! Transmit, Mux, and the Actor/Partner Churn monitors, with Selection
//! assigning ports to aggregators. All of them are owned by the port's task
//! ([`task::PortTask`]) and run to completion between suspension points.

pub mod churn;
pub mod info;
pub mod muxm;
pub mod port;
pub mod ptxm;
pub mod rxm;
pub mod selection;
pub mod task;
pub mod txm;

pub use churn::{ChurnKind, ChurnMachine, ChurnState};
pub use info::{info_equal, oper_mode, same_partner};
pub use muxm::{MuxMachine, MuxState};
pub use port::{AggPort, PortCounters, Selected};
pub use ptxm::{PeriodicMachine, PeriodicState};
pub use rxm::{RxEvent, RxMachine, RxState};
pub use selection::{Aggregator, SelectionKey, SelectionTable};
pub use task::{Lag, PortEvent, PortSnapshot};
pub use txm::TxMachine;

/// Timer and rate constants of 802.1AX clause 6.4.4
pub mod constants {
    use std::time::Duration;

    /// Interval between periodic transmissions under short timeouts
    pub const FAST_PERIODIC_TIME: Duration = Duration::from_secs(1);

    /// Interval between periodic transmissions under long timeouts
    pub const SLOW_PERIODIC_TIME: Duration = Duration::from_secs(30);

    /// Receive-info validity under short timeouts (3 × fast)
    pub const SHORT_TIMEOUT_TIME: Duration = Duration::from_secs(3);

    /// Receive-info validity under long timeouts (3 × slow)
    pub const LONG_TIMEOUT_TIME: Duration = Duration::from_secs(90);

    /// How long the churn monitors wait for Sync to stabilize
    pub const CHURN_DETECTION_TIME: Duration = Duration::from_secs(60);

    /// Delay before attaching, so parallel links aggregate together
    pub const AGGREGATE_WAIT_TIME: Duration = Duration::from_secs(2);

    /// Maximum LACPDUs transmitted per fast-periodic window
    pub const MAX_TX_PER_WINDOW: u8 = 3;
}

/// Side effects a machine asks its owning task to carry out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// The Transmit machine should emit an LACPDU when budget allows
    Ntt,
    /// Partner information changed in a way Selection must look at
    RunSelection,
}
