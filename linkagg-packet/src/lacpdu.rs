//! LACPDU parsing and construction (802.1AX version 1)
//!
//! The LACPDU is a fixed-layout PDU: Slow Protocols subtype, version, then
//! Actor Info, Partner Info, and Collector Info TLVs, a zero terminator and
//! reserved padding up to 110 octets. All integers are big-endian.

use bytes::{BufMut, BytesMut};
use linkagg_core::{Error, MacAddr, PortId, Result, SystemId};
use std::fmt;

/// Slow Protocols subtype for LACP
pub const LACP_SUBTYPE: u8 = 0x01;

/// LACP version implemented by this actor
pub const LACP_VERSION: u8 = 0x01;

/// PDU length without link-layer framing
pub const LACPDU_LEN: usize = 110;

const TLV_ACTOR: u8 = 0x01;
const TLV_PARTNER: u8 = 0x02;
const TLV_COLLECTOR: u8 = 0x03;
const TLV_TERMINATOR: u8 = 0x00;

const PORT_INFO_TLV_LEN: u8 = 0x14; // 20 octets including type + length
const COLLECTOR_TLV_LEN: u8 = 0x10; // 16 octets including type + length

/// The 8-bit actor/partner state vector carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LacpState(pub u8);

impl LacpState {
    pub const ACTIVITY: u8 = 1 << 0;
    pub const TIMEOUT: u8 = 1 << 1; // set = short timeout
    pub const AGGREGATION: u8 = 1 << 2;
    pub const SYNC: u8 = 1 << 3;
    pub const COLLECTING: u8 = 1 << 4;
    pub const DISTRIBUTING: u8 = 1 << 5;
    pub const DEFAULTED: u8 = 1 << 6;
    pub const EXPIRED: u8 = 1 << 7;

    pub fn is_set(&self, bits: u8) -> bool {
        self.0 & bits == bits
    }

    pub fn set(&mut self, bits: u8) {
        self.0 |= bits;
    }

    pub fn clear(&mut self, bits: u8) {
        self.0 &= !bits;
    }

    pub fn assign(&mut self, bits: u8, value: bool) {
        if value {
            self.set(bits)
        } else {
            self.clear(bits)
        }
    }

    pub fn activity(&self) -> bool {
        self.is_set(Self::ACTIVITY)
    }

    pub fn short_timeout(&self) -> bool {
        self.is_set(Self::TIMEOUT)
    }

    pub fn aggregation(&self) -> bool {
        self.is_set(Self::AGGREGATION)
    }

    pub fn sync(&self) -> bool {
        self.is_set(Self::SYNC)
    }

    pub fn collecting(&self) -> bool {
        self.is_set(Self::COLLECTING)
    }

    pub fn distributing(&self) -> bool {
        self.is_set(Self::DISTRIBUTING)
    }

    pub fn defaulted(&self) -> bool {
        self.is_set(Self::DEFAULTED)
    }

    pub fn expired(&self) -> bool {
        self.is_set(Self::EXPIRED)
    }
}

impl fmt::Display for LacpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 8] = [
            "Act", "Sto", "Agg", "Syn", "Col", "Dis", "Def", "Exp",
        ];
        let mut first = true;
        for (i, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << i) != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// One actor or partner information block as carried in the PDU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PduPortInfo {
    pub system: SystemId,
    pub key: u16,
    pub port_priority: u16,
    pub port: PortId,
    pub state: LacpState,
}

impl PduPortInfo {
    fn parse(data: &[u8]) -> Self {
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&data[2..8]);
        Self {
            system: SystemId::new(u16::from_be_bytes([data[0], data[1]]), MacAddr(mac)),
            key: u16::from_be_bytes([data[8], data[9]]),
            port_priority: u16::from_be_bytes([data[10], data[11]]),
            port: PortId(u16::from_be_bytes([data[12], data[13]])),
            state: LacpState(data[14]),
        }
    }

    fn put(&self, bytes: &mut BytesMut) {
        bytes.put_u16(self.system.priority);
        bytes.put_slice(&self.system.mac.0);
        bytes.put_u16(self.key);
        bytes.put_u16(self.port_priority);
        bytes.put_u16(self.port.0);
        bytes.put_u8(self.state.0);
        bytes.put_bytes(0, 3); // reserved
    }
}

/// A complete version-1 LACPDU
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lacpdu {
    pub version: u8,
    pub actor: PduPortInfo,
    pub partner: PduPortInfo,
    pub collector_max_delay: u16,
}

impl Lacpdu {
    pub fn new(actor: PduPortInfo, partner: PduPortInfo) -> Self {
        Self {
            version: LACP_VERSION,
            actor,
            partner,
            collector_max_delay: 0,
        }
    }

    /// Parse an LACPDU from the Slow Protocols payload (subtype included)
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < LACPDU_LEN {
            return Err(Error::malformed(format!(
                "LACPDU too short: {} bytes (need {LACPDU_LEN})",
                data.len()
            )));
        }
        if data[0] != LACP_SUBTYPE {
            return Err(Error::malformed(format!(
                "not an LACPDU: subtype 0x{:02x}",
                data[0]
            )));
        }
        let version = data[1];

        // Actor Info TLV
        if data[2] != TLV_ACTOR || data[3] != PORT_INFO_TLV_LEN {
            return Err(Error::malformed("bad Actor Info TLV header"));
        }
        let actor = PduPortInfo::parse(&data[4..19]);

        // Partner Info TLV
        if data[22] != TLV_PARTNER || data[23] != PORT_INFO_TLV_LEN {
            return Err(Error::malformed("bad Partner Info TLV header"));
        }
        let partner = PduPortInfo::parse(&data[24..39]);

        // Collector Info TLV
        if data[42] != TLV_COLLECTOR || data[43] != COLLECTOR_TLV_LEN {
            return Err(Error::malformed("bad Collector Info TLV header"));
        }
        let collector_max_delay = u16::from_be_bytes([data[44], data[45]]);

        // Terminator
        if data[58] != TLV_TERMINATOR || data[59] != 0 {
            return Err(Error::malformed("bad terminator TLV"));
        }

        Ok(Self {
            version,
            actor,
            partner,
            collector_max_delay,
        })
    }

    /// Build the PDU to its fixed 110-octet wire form
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(LACPDU_LEN);
        bytes.put_u8(LACP_SUBTYPE);
        bytes.put_u8(self.version);

        bytes.put_u8(TLV_ACTOR);
        bytes.put_u8(PORT_INFO_TLV_LEN);
        self.actor.put(&mut bytes);

        bytes.put_u8(TLV_PARTNER);
        bytes.put_u8(PORT_INFO_TLV_LEN);
        self.partner.put(&mut bytes);

        bytes.put_u8(TLV_COLLECTOR);
        bytes.put_u8(COLLECTOR_TLV_LEN);
        bytes.put_u16(self.collector_max_delay);
        bytes.put_bytes(0, 12); // reserved

        bytes.put_u8(TLV_TERMINATOR);
        bytes.put_u8(0);
        bytes.put_bytes(0, 50); // pad to the fixed PDU length

        debug_assert_eq!(bytes.len(), LACPDU_LEN);
        bytes.to_vec()
    }
}
