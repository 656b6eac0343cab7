//! Distributed Relay portal state
//!
//! One `DistributedRelay` per portal per system. It owns the per-system
//! state vectors and the four conversation maps; the Gateway and Aggregator
//! machines are their only writers. Neighbour records arrive as messages
//! from the IPP tasks and are kept here so `update_portal_state` can
//! rebuild the vectors from the most recently accepted DRCPDUs.

use linkagg_core::{IppId, PortalConfig, PortalSystemNumber, MAX_CONVERSATIONS};
use linkagg_packet::{conv_admin_digest, ConversationVector, DrcpState};
use std::collections::HashMap;

/// Per-portal-system state: which conversations its gateway can pass and
/// which aggregation ports it is distributing on
#[derive(Debug, Clone, Default)]
pub struct PortalSystemState {
    pub gateway_vector: ConversationVector,
    pub active_ports: Vec<u32>,
}

impl PortalSystemState {
    pub fn zero(&mut self) {
        self.gateway_vector.clear_all();
        self.active_ports.clear();
    }
}

/// The last accepted DRCPDU content from one IPP's neighbour
#[derive(Debug, Clone)]
pub struct NeighborRecord {
    pub system_number: PortalSystemNumber,
    pub state: DrcpState,
    pub oper_aggregator_key: u16,
    pub gateway_vector: Option<ConversationVector>,
    pub port_vector: Option<ConversationVector>,
    pub active_ports: Vec<u32>,
    pub differ_gateway_digest: bool,
    pub differ_port_digest: bool,
}

/// Portal-wide operational state of the Distributed Relay
#[derive(Debug)]
pub struct DistributedRelay {
    pub cfg: PortalConfig,
    pub gateway_digest: [u8; 16],
    pub port_digest: [u8; 16],

    /// Indexed by PortalSystemNumber::index()
    pub portal_system_state: [PortalSystemState; 3],

    /// Which system is responsible for each gateway conversation ID
    pub gateway_conversation: Vec<Option<PortalSystemNumber>>,
    /// Which system is responsible for each port conversation ID
    pub port_conversation: Vec<Option<PortalSystemNumber>>,
    /// Conversations this system's gateway passes
    pub ps_gateway_conversation: ConversationVector,
    /// Conversations this system's aggregator ports carry
    pub ps_port_conversation: ConversationVector,

    /// Local gateway capability, operator supplied
    pub home_gateway_vector: ConversationVector,
    /// Local distributing aggregation ports
    pub home_active_ports: Vec<u32>,

    pub gateway_conversation_update: bool,
    pub port_conversation_update: bool,
    pub ipp_gateway_update: HashMap<IppId, bool>,
    pub ipp_port_update: HashMap<IppId, bool>,

    pub neighbors: HashMap<IppId, NeighborRecord>,
}

impl DistributedRelay {
    pub fn new(cfg: PortalConfig) -> Self {
        let gateway_digest = conv_admin_digest(&cfg.conv_admin_gateway);
        let port_digest = conv_admin_digest(&cfg.conv_admin_port);
        let ipp_flags: HashMap<IppId, bool> =
            cfg.ipp_list.iter().map(|i| (i.id, false)).collect();
        Self {
            cfg,
            gateway_digest,
            port_digest,
            portal_system_state: Default::default(),
            gateway_conversation: vec![None; MAX_CONVERSATIONS],
            port_conversation: vec![None; MAX_CONVERSATIONS],
            ps_gateway_conversation: ConversationVector::new(),
            ps_port_conversation: ConversationVector::new(),
            home_gateway_vector: ConversationVector::new(),
            home_active_ports: Vec::new(),
            gateway_conversation_update: false,
            port_conversation_update: false,
            ipp_gateway_update: ipp_flags.clone(),
            ipp_port_update: ipp_flags,
            neighbors: HashMap::new(),
        }
    }

    pub fn home_system_number(&self) -> PortalSystemNumber {
        self.cfg.portal_system_number
    }

    /// Rebuild `portal_system_state[]`: the home entry from local state,
    /// each neighbour entry from that IPP's last accepted DRCPDU. Entries
    /// of systems with no live neighbour record stay zeroed.
    pub fn update_portal_state(&mut self) {
        for entry in &mut self.portal_system_state {
            entry.zero();
        }
        let home = self.home_system_number().index();
        self.portal_system_state[home].gateway_vector = self.home_gateway_vector.clone();
        self.portal_system_state[home].active_ports = self.home_active_ports.clone();

        for record in self.neighbors.values() {
            let entry = &mut self.portal_system_state[record.system_number.index()];
            if let Some(vector) = &record.gateway_vector {
                entry.gateway_vector = vector.clone();
            }
            entry.active_ports = record.active_ports.clone();
        }
    }

    /// A neighbour went silent: drop its record and zero its entry
    pub fn clear_neighbor(&mut self, ipp: IppId) {
        if let Some(record) = self.neighbors.remove(&ipp) {
            self.portal_system_state[record.system_number.index()].zero();
        }
        self.gateway_conversation_update = true;
        self.port_conversation_update = true;
    }

    /// Logical OR of the IppGatewayUpdate flags
    pub fn ipp_all_gateway_update(&self) -> bool {
        self.ipp_gateway_update.values().any(|v| *v)
    }

    /// Logical OR of the IppPortUpdate flags
    pub fn ipp_all_port_update(&self) -> bool {
        self.ipp_port_update.values().any(|v| *v)
    }
}

/// Fixture shared by the DRNI unit tests: a two-system portal
#[cfg(test)]
pub(crate) fn test_portal_config(psn: u8) -> PortalConfig {
    use linkagg_core::{IppConfig, MacAddr};
    let neighbor = if psn == 1 { 2 } else { 1 };
    PortalConfig {
        portal_priority: 0x8000,
        portal_addr: MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
        portal_system_number: PortalSystemNumber::new(psn).unwrap(),
        aggregator_priority: 0x8000,
        aggregator_id: MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x66]),
        ipp_list: vec![IppConfig {
            id: IppId(1),
            neighbor_system_number: PortalSystemNumber::new(neighbor).unwrap(),
        }],
        conv_admin_gateway: vec![Vec::new(); MAX_CONVERSATIONS],
        conv_admin_port: vec![Vec::new(); MAX_CONVERSATIONS],
        port_algorithm: 2,
        gateway_algorithm: 2,
        common_methods: false,
        three_system_portal: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor_record(psn: u8) -> NeighborRecord {
        let mut gv = ConversationVector::new();
        gv.set(7, true);
        NeighborRecord {
            system_number: PortalSystemNumber::new(psn).unwrap(),
            state: DrcpState(DrcpState::IPP_ACTIVITY),
            oper_aggregator_key: 10,
            gateway_vector: Some(gv),
            port_vector: None,
            active_ports: vec![3],
            differ_gateway_digest: false,
            differ_port_digest: false,
        }
    }

    #[test]
    fn test_update_portal_state_home_and_neighbor() {
        let mut relay = DistributedRelay::new(test_portal_config(1));
        relay.home_gateway_vector.set(100, true);
        relay.home_active_ports = vec![1, 2];
        relay.neighbors.insert(IppId(1), neighbor_record(2));

        relay.update_portal_state();

        assert!(relay.portal_system_state[0].gateway_vector.get(100));
        assert_eq!(relay.portal_system_state[0].active_ports, vec![1, 2]);
        assert!(relay.portal_system_state[1].gateway_vector.get(7));
        assert_eq!(relay.portal_system_state[1].active_ports, vec![3]);
        assert!(relay.portal_system_state[2].gateway_vector.is_zero());
    }

    #[test]
    fn test_clear_neighbor_zeroes_entry_and_raises_updates() {
        let mut relay = DistributedRelay::new(test_portal_config(1));
        relay.neighbors.insert(IppId(1), neighbor_record(2));
        relay.update_portal_state();
        assert!(!relay.portal_system_state[1].gateway_vector.is_zero());

        relay.clear_neighbor(IppId(1));
        assert!(relay.portal_system_state[1].gateway_vector.is_zero());
        assert!(relay.gateway_conversation_update);
        assert!(relay.port_conversation_update);
        assert!(relay.neighbors.is_empty());
    }

    #[test]
    fn test_ipp_update_flags_aggregate() {
        let mut relay = DistributedRelay::new(test_portal_config(1));
        assert!(!relay.ipp_all_gateway_update());
        relay.ipp_gateway_update.insert(IppId(1), true);
        assert!(relay.ipp_all_gateway_update());
    }

    #[test]
    fn test_digests_derive_from_admin_tables() {
        let mut cfg = test_portal_config(1);
        let relay_a = DistributedRelay::new(cfg.clone());
        cfg.conv_admin_gateway[9] = vec![PortalSystemNumber::new(1).unwrap()];
        let relay_b = DistributedRelay::new(cfg);
        assert_ne!(relay_a.gateway_digest, relay_b.gateway_digest);
        assert_eq!(relay_a.port_digest, relay_b.port_digest);
    }
}
