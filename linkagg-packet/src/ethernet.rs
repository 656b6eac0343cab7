//! Ethernet II frame construction and parsing
//!
//! Only what the Slow Protocols control plane needs: untagged Ethernet II
//! frames carrying LACPDUs and DRCPDUs.

use bytes::{BufMut, BytesMut};
use linkagg_core::{Error, MacAddr, Result};

/// Slow Protocols ethertype (LACP, marker, DRCP)
pub const SLOW_PROTOCOLS_ETHERTYPE: u16 = 0x8809;

/// Slow Protocols destination multicast address
pub const SLOW_PROTOCOLS_MAC: MacAddr = MacAddr([0x01, 0x80, 0xC2, 0x00, 0x00, 0x02]);

const HEADER_LEN: usize = 14;

/// EtherType values the control plane recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    /// Slow Protocols (0x8809)
    SlowProtocols,
    /// Anything else
    Other(u16),
}

impl EtherType {
    pub fn to_u16(self) -> u16 {
        match self {
            EtherType::SlowProtocols => SLOW_PROTOCOLS_ETHERTYPE,
            EtherType::Other(val) => val,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            SLOW_PROTOCOLS_ETHERTYPE => EtherType::SlowProtocols,
            val => EtherType::Other(val),
        }
    }
}

/// An Ethernet II frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub dst: MacAddr,
    pub src: MacAddr,
    pub ethertype: EtherType,
    pub payload: Vec<u8>,
}

impl EthernetFrame {
    /// Frame a Slow Protocols PDU for transmission
    pub fn slow_protocols(src: MacAddr, payload: Vec<u8>) -> Self {
        Self {
            dst: SLOW_PROTOCOLS_MAC,
            src,
            ethertype: EtherType::SlowProtocols,
            payload,
        }
    }

    /// Parse a frame from raw bytes
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::malformed(format!(
                "Ethernet frame too short: {} bytes",
                data.len()
            )));
        }

        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        let ethertype = EtherType::from_u16(u16::from_be_bytes([data[12], data[13]]));

        Ok(Self {
            dst: MacAddr(dst),
            src: MacAddr(src),
            ethertype,
            payload: data[HEADER_LEN..].to_vec(),
        })
    }

    /// Build the frame to bytes
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        bytes.put_slice(&self.dst.0);
        bytes.put_slice(&self.src.0);
        bytes.put_u16(self.ethertype.to_u16());
        bytes.put_slice(&self.payload);
        bytes.to_vec()
    }

    /// Total on-wire length in octets (without FCS)
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }
}
