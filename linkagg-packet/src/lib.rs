//! Wire codecs for linkagg
//!
//! This crate contains the link-layer framing and the protocol data unit
//! codecs used by the control plane:
//! - Ethernet II framing for the Slow Protocols ethertype
//! - LACPDU (fixed layout, version 1)
//! - DRCPDU (TLV encoded, version 1), including the 4096-bit conversation
//!   vector bitmap
//!
//! Parsers return [`linkagg_core::Error::MalformedPdu`] on structural
//! violations and never panic on attacker-controlled input.

pub mod drcpdu;
pub mod ethernet;
pub mod lacpdu;

pub use drcpdu::{
    conv_admin_digest, ConversationVector, DrcpState, Drcpdu, HomePortsInfoTlv,
    NetworkIplEncapsulationTlv, PortalConfigInfoTlv, PortalInfoTlv, TopologyState, DRCP_SUBTYPE,
};
pub use ethernet::{EtherType, EthernetFrame, SLOW_PROTOCOLS_ETHERTYPE, SLOW_PROTOCOLS_MAC};
pub use lacpdu::{LacpState, Lacpdu, PduPortInfo, LACP_SUBTYPE, LACP_VERSION};
