//! DRCPDU parsing and construction (802.1AX-2014 version 1)
//!
//! A DRCPDU is the Slow Protocols DRCP subtype followed by a TLV chain:
//! Portal Information, Portal Configuration Information, DRCP State, Home
//! Ports Information, the conditional two-portal conversation vector TLVs,
//! the optional Network/IPL sharing pair, and a terminator.
//!
//! Each TLV is prefixed by a packed big-endian 16-bit header: 6 bits of
//! type, 10 bits of length. The length counts the whole TLV, header
//! included — a terminator is 2, a conversation vector TLV 514. A plain
//! 8-bit length cannot carry the 512-octet vectors, which is why the header
//! is packed.

use bytes::{BufMut, BytesMut};
use linkagg_core::config::ConvAdminTable;
use linkagg_core::{Error, MacAddr, Result, MAX_CONVERSATIONS};
use std::fmt;

/// Slow Protocols subtype for DRCP
pub const DRCP_SUBTYPE: u8 = 0x0D;

/// DRCP version implemented here
pub const DRCP_VERSION: u8 = 0x01;

/// Conversation vector payload size: 4096 bits
pub const CONVERSATION_VECTOR_LEN: usize = 512;

const TLV_TERMINATOR: u8 = 0x00;
const TLV_PORTAL_INFO: u8 = 0x01;
const TLV_PORTAL_CONFIG: u8 = 0x02;
const TLV_STATE: u8 = 0x03;
const TLV_HOME_PORTS: u8 = 0x04;
const TLV_GATEWAY_VECTOR_2P: u8 = 0x05;
const TLV_PORT_VECTOR_2P: u8 = 0x06;
const TLV_IPL_METHOD: u8 = 0x07;
const TLV_IPL_ENCAP: u8 = 0x08;

const LEN_TERMINATOR: usize = 2;
const LEN_PORTAL_INFO: usize = 18;
const LEN_PORTAL_CONFIG: usize = 46;
const LEN_STATE: usize = 3;
const LEN_HOME_PORTS_BASE: usize = 6; // + 4 per active port
const LEN_VECTOR: usize = 2 + CONVERSATION_VECTOR_LEN;
const LEN_IPL_METHOD: usize = 7;
const LEN_IPL_ENCAP: usize = 34;

fn put_tlv_header(bytes: &mut BytesMut, tlv_type: u8, total_len: usize) {
    debug_assert!(total_len < 1 << 10);
    bytes.put_u16(((tlv_type as u16) << 10) | total_len as u16);
}

fn tlv_header(data: &[u8]) -> (u8, usize) {
    let packed = u16::from_be_bytes([data[0], data[1]]);
    ((packed >> 10) as u8, (packed & 0x03FF) as usize)
}

/// DRCP per-IPP state byte, exchanged in the DRCP State TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrcpState(pub u8);

impl DrcpState {
    pub const HOME_GATEWAY: u8 = 1 << 0;
    pub const NEIGHBOR_GATEWAY: u8 = 1 << 1;
    pub const OTHER_GATEWAY: u8 = 1 << 2;
    pub const IPP_ACTIVITY: u8 = 1 << 3;
    pub const TIMEOUT: u8 = 1 << 4; // set = short timeout
    pub const GATEWAY_SYNC: u8 = 1 << 5;
    pub const PORT_SYNC: u8 = 1 << 6;
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

    pub fn short_timeout(&self) -> bool {
        self.is_set(Self::TIMEOUT)
    }

    pub fn expired(&self) -> bool {
        self.is_set(Self::EXPIRED)
    }
}

/// Topology state word of the Portal Configuration Information TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TopologyState(pub u16);

impl TopologyState {
    const PSN_MASK: u16 = 0x0003;
    const THREE_SYSTEM: u16 = 1 << 2;
    const COMMON_METHODS: u16 = 1 << 3;

    pub fn portal_system_number(&self) -> u8 {
        (self.0 & Self::PSN_MASK) as u8
    }

    pub fn set_portal_system_number(&mut self, psn: u8) {
        self.0 = (self.0 & !Self::PSN_MASK) | (psn as u16 & Self::PSN_MASK);
    }

    pub fn three_system_portal(&self) -> bool {
        self.0 & Self::THREE_SYSTEM != 0
    }

    pub fn set_three_system_portal(&mut self, on: bool) {
        if on {
            self.0 |= Self::THREE_SYSTEM;
        } else {
            self.0 &= !Self::THREE_SYSTEM;
        }
    }

    pub fn common_methods(&self) -> bool {
        self.0 & Self::COMMON_METHODS != 0
    }

    pub fn set_common_methods(&mut self, on: bool) {
        if on {
            self.0 |= Self::COMMON_METHODS;
        } else {
            self.0 &= !Self::COMMON_METHODS;
        }
    }
}

/// Portal Information TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortalInfoTlv {
    pub aggregator_priority: u16,
    pub aggregator_id: MacAddr,
    pub portal_priority: u16,
    pub portal_addr: MacAddr,
}

/// Portal Configuration Information TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortalConfigInfoTlv {
    pub topology_state: TopologyState,
    pub oper_aggregator_key: u16,
    pub port_algorithm: u32,
    pub gateway_algorithm: u32,
    pub port_digest: [u8; 16],
    pub gateway_digest: [u8; 16],
}

/// Home Ports Information TLV
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HomePortsInfoTlv {
    pub admin_aggregator_key: u16,
    pub oper_partner_aggregator_key: u16,
    pub active_ports: Vec<u32>,
}

/// Network/IPL Sharing Encapsulation TLV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkIplEncapsulationTlv {
    pub ipl_encap_digest: [u8; 16],
    pub net_encap_digest: [u8; 16],
}

/// A 4096-bit conversation membership vector, one bit per conversation ID.
///
/// Bit 7 of octet 0 is conversation 0; bit 7 of octet `i` is conversation
/// `8·i`. Setters accumulate with OR/AND-NOT so neighbouring bits in an
/// octet are never clobbered.
#[derive(Clone, PartialEq, Eq)]
pub struct ConversationVector(Box<[u8; CONVERSATION_VECTOR_LEN]>);

impl ConversationVector {
    pub fn new() -> Self {
        Self(Box::new([0u8; CONVERSATION_VECTOR_LEN]))
    }

    pub fn from_octets(octets: [u8; CONVERSATION_VECTOR_LEN]) -> Self {
        Self(Box::new(octets))
    }

    pub fn get(&self, conv_id: usize) -> bool {
        debug_assert!(conv_id < MAX_CONVERSATIONS);
        self.0[conv_id / 8] & (0x80 >> (conv_id % 8)) != 0
    }

    pub fn set(&mut self, conv_id: usize, value: bool) {
        debug_assert!(conv_id < MAX_CONVERSATIONS);
        let mask = 0x80 >> (conv_id % 8);
        if value {
            self.0[conv_id / 8] |= mask;
        } else {
            self.0[conv_id / 8] &= !mask;
        }
    }

    pub fn clear_all(&mut self) {
        self.0.fill(0);
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }

    pub fn as_octets(&self) -> &[u8; CONVERSATION_VECTOR_LEN] {
        &self.0
    }
}

impl Default for ConversationVector {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConversationVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set: Vec<usize> = (0..MAX_CONVERSATIONS).filter(|&i| self.get(i)).collect();
        write!(f, "ConversationVector({} set", set.len())?;
        for id in set.iter().take(8) {
            write!(f, " {id}")?;
        }
        if set.len() > 8 {
            write!(f, " ..")?;
        }
        write!(f, ")")
    }
}

/// A complete version-1 DRCPDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drcpdu {
    pub version: u8,
    pub portal_info: PortalInfoTlv,
    pub portal_config: PortalConfigInfoTlv,
    pub state: DrcpState,
    pub home_ports: HomePortsInfoTlv,
    pub gateway_vector: Option<ConversationVector>,
    pub port_vector: Option<ConversationVector>,
    pub ipl_method: Option<[u8; 4]>,
    pub ipl_encapsulation: Option<NetworkIplEncapsulationTlv>,
}

impl Drcpdu {
    pub fn new(
        portal_info: PortalInfoTlv,
        portal_config: PortalConfigInfoTlv,
        state: DrcpState,
        home_ports: HomePortsInfoTlv,
    ) -> Self {
        Self {
            version: DRCP_VERSION,
            portal_info,
            portal_config,
            state,
            home_ports,
            gateway_vector: None,
            port_vector: None,
            ipl_method: None,
            ipl_encapsulation: None,
        }
    }

    /// On-wire PDU length in octets, link-layer framing excluded
    pub fn wire_len(&self) -> usize {
        let mut len = 2; // subtype + version
        len += LEN_PORTAL_INFO + LEN_PORTAL_CONFIG + LEN_STATE;
        len += LEN_HOME_PORTS_BASE + 4 * self.home_ports.active_ports.len();
        if self.gateway_vector.is_some() {
            len += LEN_VECTOR;
        }
        if self.port_vector.is_some() {
            len += LEN_VECTOR;
        }
        if self.ipl_method.is_some() {
            len += LEN_IPL_METHOD;
        }
        if self.ipl_encapsulation.is_some() {
            len += LEN_IPL_ENCAP;
        }
        len + LEN_TERMINATOR
    }

    /// Build the PDU to bytes
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = BytesMut::with_capacity(self.wire_len());
        bytes.put_u8(DRCP_SUBTYPE);
        bytes.put_u8(self.version);

        put_tlv_header(&mut bytes, TLV_PORTAL_INFO, LEN_PORTAL_INFO);
        bytes.put_u16(self.portal_info.aggregator_priority);
        bytes.put_slice(&self.portal_info.aggregator_id.0);
        bytes.put_u16(self.portal_info.portal_priority);
        bytes.put_slice(&self.portal_info.portal_addr.0);

        put_tlv_header(&mut bytes, TLV_PORTAL_CONFIG, LEN_PORTAL_CONFIG);
        bytes.put_u16(self.portal_config.topology_state.0);
        bytes.put_u16(self.portal_config.oper_aggregator_key);
        bytes.put_u32(self.portal_config.port_algorithm);
        bytes.put_u32(self.portal_config.gateway_algorithm);
        bytes.put_slice(&self.portal_config.port_digest);
        bytes.put_slice(&self.portal_config.gateway_digest);

        put_tlv_header(&mut bytes, TLV_STATE, LEN_STATE);
        bytes.put_u8(self.state.0);

        let home_len = LEN_HOME_PORTS_BASE + 4 * self.home_ports.active_ports.len();
        put_tlv_header(&mut bytes, TLV_HOME_PORTS, home_len);
        bytes.put_u16(self.home_ports.admin_aggregator_key);
        bytes.put_u16(self.home_ports.oper_partner_aggregator_key);
        for port in &self.home_ports.active_ports {
            bytes.put_u32(*port);
        }

        if let Some(vector) = &self.gateway_vector {
            put_tlv_header(&mut bytes, TLV_GATEWAY_VECTOR_2P, LEN_VECTOR);
            bytes.put_slice(vector.as_octets());
        }
        if let Some(vector) = &self.port_vector {
            put_tlv_header(&mut bytes, TLV_PORT_VECTOR_2P, LEN_VECTOR);
            bytes.put_slice(vector.as_octets());
        }

        if let Some(method) = &self.ipl_method {
            put_tlv_header(&mut bytes, TLV_IPL_METHOD, LEN_IPL_METHOD);
            bytes.put_slice(method);
            bytes.put_u8(0); // reserved
        }
        if let Some(encap) = &self.ipl_encapsulation {
            put_tlv_header(&mut bytes, TLV_IPL_ENCAP, LEN_IPL_ENCAP);
            bytes.put_slice(&encap.ipl_encap_digest);
            bytes.put_slice(&encap.net_encap_digest);
        }

        put_tlv_header(&mut bytes, TLV_TERMINATOR, LEN_TERMINATOR);

        debug_assert_eq!(bytes.len(), self.wire_len());
        bytes.to_vec()
    }

    /// Parse a DRCPDU from the Slow Protocols payload (subtype included).
    ///
    /// Unknown TLV types are skipped; the chain must contain the four
    /// mandatory TLVs and end with a terminator.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::malformed("DRCPDU too short"));
        }
        if data[0] != DRCP_SUBTYPE {
            return Err(Error::malformed(format!(
                "not a DRCPDU: subtype 0x{:02x}",
                data[0]
            )));
        }
        let version = data[1];

        let mut portal_info = None;
        let mut portal_config = None;
        let mut state = None;
        let mut home_ports = None;
        let mut gateway_vector = None;
        let mut port_vector = None;
        let mut ipl_method = None;
        let mut ipl_encapsulation = None;
        let mut terminated = false;

        let mut offset = 2;
        while offset + 2 <= data.len() {
            let (tlv_type, tlv_len) = tlv_header(&data[offset..]);
            if tlv_type == TLV_TERMINATOR {
                if tlv_len != LEN_TERMINATOR {
                    return Err(Error::malformed("bad terminator TLV length"));
                }
                terminated = true;
                break;
            }
            if tlv_len < 2 || offset + tlv_len > data.len() {
                return Err(Error::malformed(format!(
                    "TLV 0x{tlv_type:02x} length {tlv_len} overruns PDU"
                )));
            }
            let value = &data[offset + 2..offset + tlv_len];
            match tlv_type {
                TLV_PORTAL_INFO => {
                    expect_len(tlv_type, tlv_len, LEN_PORTAL_INFO)?;
                    portal_info = Some(PortalInfoTlv {
                        aggregator_priority: u16::from_be_bytes([value[0], value[1]]),
                        aggregator_id: mac_at(value, 2),
                        portal_priority: u16::from_be_bytes([value[8], value[9]]),
                        portal_addr: mac_at(value, 10),
                    });
                }
                TLV_PORTAL_CONFIG => {
                    expect_len(tlv_type, tlv_len, LEN_PORTAL_CONFIG)?;
                    let mut port_digest = [0u8; 16];
                    let mut gateway_digest = [0u8; 16];
                    port_digest.copy_from_slice(&value[12..28]);
                    gateway_digest.copy_from_slice(&value[28..44]);
                    portal_config = Some(PortalConfigInfoTlv {
                        topology_state: TopologyState(u16::from_be_bytes([value[0], value[1]])),
                        oper_aggregator_key: u16::from_be_bytes([value[2], value[3]]),
                        port_algorithm: u32::from_be_bytes([
                            value[4], value[5], value[6], value[7],
                        ]),
                        gateway_algorithm: u32::from_be_bytes([
                            value[8], value[9], value[10], value[11],
                        ]),
                        port_digest,
                        gateway_digest,
                    });
                }
                TLV_STATE => {
                    expect_len(tlv_type, tlv_len, LEN_STATE)?;
                    state = Some(DrcpState(value[0]));
                }
                TLV_HOME_PORTS => {
                    if tlv_len < LEN_HOME_PORTS_BASE || (tlv_len - LEN_HOME_PORTS_BASE) % 4 != 0 {
                        return Err(Error::malformed("bad Home Ports Info TLV length"));
                    }
                    let active_ports = value[4..]
                        .chunks_exact(4)
                        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
                        .collect();
                    home_ports = Some(HomePortsInfoTlv {
                        admin_aggregator_key: u16::from_be_bytes([value[0], value[1]]),
                        oper_partner_aggregator_key: u16::from_be_bytes([value[2], value[3]]),
                        active_ports,
                    });
                }
                TLV_GATEWAY_VECTOR_2P | TLV_PORT_VECTOR_2P => {
                    expect_len(tlv_type, tlv_len, LEN_VECTOR)?;
                    let mut octets = [0u8; CONVERSATION_VECTOR_LEN];
                    octets.copy_from_slice(value);
                    let vector = ConversationVector::from_octets(octets);
                    if tlv_type == TLV_GATEWAY_VECTOR_2P {
                        gateway_vector = Some(vector);
                    } else {
                        port_vector = Some(vector);
                    }
                }
                TLV_IPL_METHOD => {
                    expect_len(tlv_type, tlv_len, LEN_IPL_METHOD)?;
                    ipl_method = Some([value[0], value[1], value[2], value[3]]);
                }
                TLV_IPL_ENCAP => {
                    expect_len(tlv_type, tlv_len, LEN_IPL_ENCAP)?;
                    let mut encap = NetworkIplEncapsulationTlv::default();
                    encap.ipl_encap_digest.copy_from_slice(&value[0..16]);
                    encap.net_encap_digest.copy_from_slice(&value[16..32]);
                    ipl_encapsulation = Some(encap);
                }
                // forward compatible: unknown TLVs are skipped
                _ => {}
            }
            offset += tlv_len;
        }

        if !terminated {
            return Err(Error::malformed("DRCPDU missing terminator TLV"));
        }

        Ok(Self {
            version,
            portal_info: portal_info
                .ok_or_else(|| Error::malformed("DRCPDU missing Portal Info TLV"))?,
            portal_config: portal_config
                .ok_or_else(|| Error::malformed("DRCPDU missing Portal Config Info TLV"))?,
            state: state.ok_or_else(|| Error::malformed("DRCPDU missing DRCP State TLV"))?,
            home_ports: home_ports
                .ok_or_else(|| Error::malformed("DRCPDU missing Home Ports Info TLV"))?,
            gateway_vector,
            port_vector,
            ipl_method,
            ipl_encapsulation,
        })
    }
}

fn expect_len(tlv_type: u8, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(Error::malformed(format!(
            "TLV 0x{tlv_type:02x} length {got}, expected {want}"
        )));
    }
    Ok(())
}

fn mac_at(data: &[u8], offset: usize) -> MacAddr {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&data[offset..offset + 6]);
    MacAddr(mac)
}

/// MD5 digest of a conversation admin table, carried in the Portal
/// Configuration Information TLV so peers can detect divergent tables
/// without shipping 4096 preference lists.
pub fn conv_admin_digest(table: &ConvAdminTable) -> [u8; 16] {
    let mut bytes = Vec::with_capacity(table.len() * 2);
    for (id, prefs) in table.iter().enumerate() {
        if prefs.is_empty() {
            continue;
        }
        bytes.extend_from_slice(&(id as u16).to_be_bytes());
        for psn in prefs {
            bytes.push(psn.get());
        }
    }
    md5::compute(&bytes).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkagg_core::PortalSystemNumber;

    fn sample_pdu() -> Drcpdu {
        let mut topology = TopologyState::default();
        topology.set_portal_system_number(1);
        topology.set_common_methods(false);
        Drcpdu::new(
            PortalInfoTlv {
                aggregator_priority: 0x8000,
                aggregator_id: MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x66]),
                portal_priority: 0x7000,
                portal_addr: MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x55]),
            },
            PortalConfigInfoTlv {
                topology_state: topology,
                oper_aggregator_key: 10,
                port_algorithm: 2,
                gateway_algorithm: 2,
                port_digest: [0xAB; 16],
                gateway_digest: [0xCD; 16],
            },
            DrcpState(DrcpState::IPP_ACTIVITY | DrcpState::TIMEOUT),
            HomePortsInfoTlv {
                admin_aggregator_key: 10,
                oper_partner_aggregator_key: 11,
                active_ports: vec![1, 2, 7],
            },
        )
    }

    #[test]
    fn test_drcpdu_roundtrip_minimal() {
        let pdu = sample_pdu();
        let bytes = pdu.build();
        assert_eq!(bytes.len(), pdu.wire_len());
        assert_eq!(Drcpdu::parse(&bytes).unwrap(), pdu);
    }

    #[test]
    fn test_drcpdu_roundtrip_full() {
        let mut pdu = sample_pdu();
        let mut gv = ConversationVector::new();
        gv.set(0, true);
        gv.set(100, true);
        gv.set(4095, true);
        pdu.gateway_vector = Some(gv);
        let mut pv = ConversationVector::new();
        pv.set(7, true);
        pdu.port_vector = Some(pv);
        pdu.ipl_method = Some([1, 2, 3, 4]);
        pdu.ipl_encapsulation = Some(NetworkIplEncapsulationTlv {
            ipl_encap_digest: [1; 16],
            net_encap_digest: [2; 16],
        });

        let bytes = pdu.build();
        assert_eq!(bytes.len(), pdu.wire_len());
        assert_eq!(Drcpdu::parse(&bytes).unwrap(), pdu);
    }

    #[test]
    fn test_drcpdu_tlv_lengths_on_wire() {
        let pdu = sample_pdu();
        let bytes = pdu.build();
        // Portal Info TLV starts right after subtype + version
        let (ty, len) = tlv_header(&bytes[2..]);
        assert_eq!((ty, len), (TLV_PORTAL_INFO, 18));
        let (ty, len) = tlv_header(&bytes[2 + 18..]);
        assert_eq!((ty, len), (TLV_PORTAL_CONFIG, 46));
        let (ty, len) = tlv_header(&bytes[2 + 18 + 46..]);
        assert_eq!((ty, len), (TLV_STATE, 3));
        let (ty, len) = tlv_header(&bytes[2 + 18 + 46 + 3..]);
        assert_eq!((ty, len), (TLV_HOME_PORTS, 6 + 4 * 3));
    }

    #[test]
    fn test_drcpdu_skips_unknown_tlv() {
        let pdu = sample_pdu();
        let mut bytes = pdu.build();
        // splice an unknown 6-octet TLV (type 0x2A) before the terminator
        let term = bytes.len() - 2;
        let mut unknown = vec![0u8; 6];
        unknown[0..2].copy_from_slice(&(((0x2Au16) << 10) | 6).to_be_bytes());
        bytes.splice(term..term, unknown);
        assert_eq!(Drcpdu::parse(&bytes).unwrap(), pdu);
    }

    #[test]
    fn test_drcpdu_missing_terminator() {
        let pdu = sample_pdu();
        let bytes = pdu.build();
        assert!(Drcpdu::parse(&bytes[..bytes.len() - 2]).is_err());
    }

    #[test]
    fn test_drcpdu_missing_mandatory_tlv() {
        // a PDU with only a terminator
        let mut bytes = vec![DRCP_SUBTYPE, DRCP_VERSION];
        bytes.extend_from_slice(&(((TLV_TERMINATOR as u16) << 10) | 2).to_be_bytes());
        assert!(Drcpdu::parse(&bytes).is_err());
    }

    #[test]
    fn test_drcpdu_overrun_tlv_rejected() {
        let pdu = sample_pdu();
        let mut bytes = pdu.build();
        // claim the Portal Info TLV is longer than the PDU
        bytes[2..4].copy_from_slice(&(((TLV_PORTAL_INFO as u16) << 10) | 1000).to_be_bytes());
        assert!(Drcpdu::parse(&bytes).is_err());
    }

    #[test]
    fn test_conversation_vector_bit_order() {
        let mut v = ConversationVector::new();
        v.set(0, true);
        assert_eq!(v.as_octets()[0], 0x80);
        v.set(7, true);
        assert_eq!(v.as_octets()[0], 0x81);
        v.set(8, true);
        assert_eq!(v.as_octets()[1], 0x80);
        // clearing one bit leaves its octet-mates alone
        v.set(0, false);
        assert_eq!(v.as_octets()[0], 0x01);
        assert!(v.get(7));
        assert!(v.get(8));
        assert!(!v.get(0));
    }

    #[test]
    fn test_conversation_vector_full_range() {
        let mut v = ConversationVector::new();
        v.set(4095, true);
        assert_eq!(v.as_octets()[511], 0x01);
        assert!(v.get(4095));
    }

    #[test]
    fn test_topology_state_fields() {
        let mut t = TopologyState::default();
        t.set_portal_system_number(3);
        t.set_three_system_portal(true);
        assert_eq!(t.portal_system_number(), 3);
        assert!(t.three_system_portal());
        assert!(!t.common_methods());
        t.set_portal_system_number(1);
        assert_eq!(t.portal_system_number(), 1);
        assert!(t.three_system_portal());
    }

    #[test]
    fn test_conv_admin_digest_tracks_table() {
        let ps1 = PortalSystemNumber::new(1).unwrap();
        let ps2 = PortalSystemNumber::new(2).unwrap();
        let mut a: ConvAdminTable = vec![Vec::new(); MAX_CONVERSATIONS];
        let b = a.clone();
        assert_eq!(conv_admin_digest(&a), conv_admin_digest(&b));
        a[100] = vec![ps1, ps2];
        assert_ne!(conv_admin_digest(&a), conv_admin_digest(&b));
    }
}
