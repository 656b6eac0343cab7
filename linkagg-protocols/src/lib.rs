//! Control-plane state machines for linkagg
//!
//! Two tiers:
//! - [`lacp`] — the per-aggregation-port machines of 802.1AX clause 6:
//!   Receive, Periodic Transmit, Transmit, Mux, Churn, plus Selection and
//!   the per-port task harness.
//! - [`drni`] — the Distributed Relay machines of clause 9: per-IPP DRCP
//!   Receive/Periodic/Transmit and the portal-wide Gateway and Aggregator
//!   conversation machines.
//!
//! Machines are plain data owned by their task; they mutate the operational
//! record they are handed and return actions for the task loop to carry out.
//! Nothing in this crate touches a NIC: frames go through the
//! `linkagg_core::FrameTransport` seam.

pub mod drni;
pub mod lacp;
