//! Per-IPP operational record
//!
//! One `Ipp` per intra-portal link, owned by its task. The static portion
//! ([`IppStatic`]) is derived from the portal configuration once and shared
//! with the Transmit machine; the dynamic portion tracks NTT, the transmit
//! flags, and the neighbour record. The per-IPP recomputation flags
//! (IppGatewayUpdate/IppPortUpdate) live with their single writer in
//! `DistributedRelay`, keyed by IPP id.

use crate::drni::relay::NeighborRecord;
use linkagg_core::{IppId, MacAddr, PortId, PortalConfig, PortalSystemNumber};
use linkagg_packet::{ConversationVector, DrcpState, TopologyState};

/// Per-IPP diagnostic counters
#[derive(Debug, Clone, Copy, Default)]
pub struct IppCounters {
    pub drcpdus_rx: u64,
    pub drcpdus_tx: u64,
    pub rx_bad_pdu: u64,
    pub tx_oversize_dropped: u64,
}

/// Configuration-derived fields the Transmit machine puts on the wire
#[derive(Debug, Clone)]
pub struct IppStatic {
    pub portal_addr: MacAddr,
    pub portal_priority: u16,
    pub aggregator_id: MacAddr,
    pub aggregator_priority: u16,
    pub system_number: PortalSystemNumber,
    pub oper_aggregator_key: u16,
    pub port_algorithm: u32,
    pub gateway_algorithm: u32,
    pub port_digest: [u8; 16],
    pub gateway_digest: [u8; 16],
    pub common_methods: bool,
    pub three_system_portal: bool,
    pub ipl_sharing_method: Option<[u8; 4]>,
    /// Transport port this IPP sends and receives on
    pub transport_port: PortId,
}

impl IppStatic {
    pub fn from_config(cfg: &PortalConfig, gateway_digest: [u8; 16], port_digest: [u8; 16]) -> Self {
        Self {
            portal_addr: cfg.portal_addr,
            portal_priority: cfg.portal_priority,
            aggregator_id: cfg.aggregator_id,
            aggregator_priority: cfg.aggregator_priority,
            system_number: cfg.portal_system_number,
            oper_aggregator_key: 0,
            port_algorithm: cfg.port_algorithm,
            gateway_algorithm: cfg.gateway_algorithm,
            port_digest,
            gateway_digest,
            common_methods: cfg.common_methods,
            three_system_portal: cfg.three_system_portal,
            ipl_sharing_method: None,
            transport_port: PortId(0),
        }
    }

    pub fn topology_state(&self) -> TopologyState {
        let mut topology = TopologyState::default();
        topology.set_portal_system_number(self.system_number.get());
        topology.set_three_system_portal(self.three_system_portal);
        topology.set_common_methods(self.common_methods);
        topology
    }
}

/// Operational record of one Intra-Portal Port
#[derive(Debug)]
pub struct Ipp {
    pub id: IppId,
    pub neighbor_system_number: PortalSystemNumber,

    pub enabled: bool,
    pub drcp_enabled: bool,
    pub ntt: bool,

    pub gateway_conversation_transmit: bool,
    pub port_conversation_transmit: bool,

    pub home_state: DrcpState,
    pub neighbor: Option<NeighborRecord>,

    /// Relay-fed vectors that go out in the conversation vector TLVs: the
    /// home gateway capability map and the home port responsibility map
    pub gateway_vector_tx: ConversationVector,
    pub port_vector_tx: ConversationVector,
    pub home_active_ports: Vec<u32>,

    pub counters: IppCounters,
}

impl Ipp {
    pub fn new(id: IppId, neighbor_system_number: PortalSystemNumber) -> Self {
        let mut home_state = DrcpState::default();
        home_state.set(DrcpState::IPP_ACTIVITY | DrcpState::TIMEOUT);
        Self {
            id,
            neighbor_system_number,
            enabled: false,
            drcp_enabled: true,
            ntt: false,
            gateway_conversation_transmit: false,
            port_conversation_transmit: false,
            home_state,
            neighbor: None,
            gateway_vector_tx: ConversationVector::new(),
            port_vector_tx: ConversationVector::new(),
            home_active_ports: Vec::new(),
            counters: IppCounters::default(),
        }
    }

    /// Forget everything learned from the neighbour
    pub fn reset_neighbor(&mut self) {
        self.neighbor = None;
        self.home_state.set(DrcpState::EXPIRED);
    }
}
