//! DRNI Gateway machine (802.1AX-2014 clause 9.4.17)
//!
//! Recomputes the portal-wide gateway conversation map whenever portal
//! topology or neighbour state changes. For each conversation ID the
//! responsible system is the highest-priority entry of the admin preference
//! list among the systems whose Gateway Vector enables that ID. The
//! follow-on PsGatewayUpdate pass derives this system's own boolean vector.

use super::relay::DistributedRelay;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GmState {
    #[default]
    Initialize,
    DrniGatewayUpdate,
    PsGatewayUpdate,
}

impl fmt::Display for GmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GmState::Initialize => "DRNIGatewayInitialize",
            GmState::DrniGatewayUpdate => "DRNIGatewayUpdate",
            GmState::PsGatewayUpdate => "PsGatewayUpdate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub struct GatewayMachine {
    pub state: GmState,
}

impl GatewayMachine {
    pub fn new() -> Self {
        Self {
            state: GmState::Initialize,
        }
    }

    pub fn begin(&mut self, relay: &mut DistributedRelay) {
        relay.ps_gateway_conversation.clear_all();
        relay.gateway_conversation_update = false;
        self.state = GmState::Initialize;
    }

    /// Serve a pending GatewayConversationUpdate, then fall through to the
    /// per-system pass once no IPP still owes its own recomputation
    pub fn run(&mut self, relay: &mut DistributedRelay) {
        while relay.gateway_conversation_update {
            relay.gateway_conversation_update = false;
            relay.update_portal_state();
            for flag in relay.ipp_gateway_update.values_mut() {
                *flag = true;
            }
            Self::set_gateway_conversation(relay);
            self.state = GmState::DrniGatewayUpdate;
            debug!(state = %self.state, "gateway conversation recomputed");
        }
        if self.state == GmState::DrniGatewayUpdate && !relay.ipp_all_gateway_update() {
            Self::update_ps_gateway_conversation(relay);
            self.state = GmState::PsGatewayUpdate;
        }
    }

    /// Pick the responsible system per conversation ID: the first admin
    /// preference whose Gateway Vector enables the ID
    fn set_gateway_conversation(relay: &mut DistributedRelay) {
        for id in 0..relay.gateway_conversation.len() {
            relay.gateway_conversation[id] = relay.cfg.conv_admin_gateway[id]
                .iter()
                .find(|psn| relay.portal_system_state[psn.index()].gateway_vector.get(id))
                .copied();
        }
    }

    /// Derive this system's boolean gateway vector. With per-home methods
    /// in a two-system portal, a digest disagreement makes home back off
    /// every ID the neighbour advertises as gateway-capable, so no
    /// conversation ever has two gateways.
    fn update_ps_gateway_conversation(relay: &mut DistributedRelay) {
        let home = relay.home_system_number();
        for id in 0..relay.gateway_conversation.len() {
            relay
                .ps_gateway_conversation
                .set(id, relay.gateway_conversation[id] == Some(home));
        }
        if !relay.cfg.common_methods && !relay.cfg.three_system_portal {
            for record in relay.neighbors.values() {
                if !record.differ_gateway_digest {
                    continue;
                }
                if let Some(claimed) = &record.gateway_vector {
                    for id in 0..relay.gateway_conversation.len() {
                        if claimed.get(id) {
                            relay.ps_gateway_conversation.set(id, false);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drni::relay::{test_portal_config, NeighborRecord};
    use linkagg_core::{IppId, PortalSystemNumber};
    use linkagg_packet::{ConversationVector, DrcpState};

    fn ps(n: u8) -> PortalSystemNumber {
        PortalSystemNumber::new(n).unwrap()
    }

    fn two_system_relay() -> DistributedRelay {
        let mut cfg = test_portal_config(1);
        cfg.conv_admin_gateway[100] = vec![ps(1), ps(2)];
        let mut relay = DistributedRelay::new(cfg);
        relay.home_gateway_vector.set(100, true);

        let mut neighbor_gv = ConversationVector::new();
        neighbor_gv.set(100, true);
        relay.neighbors.insert(
            IppId(1),
            NeighborRecord {
                system_number: ps(2),
                state: DrcpState(DrcpState::IPP_ACTIVITY),
                oper_aggregator_key: 10,
                gateway_vector: Some(neighbor_gv),
                port_vector: None,
                active_ports: Vec::new(),
                differ_gateway_digest: false,
                differ_port_digest: false,
            },
        );
        relay
    }

    #[test]
    fn test_begin_zeroes_vector_and_flag() {
        let mut relay = two_system_relay();
        relay.ps_gateway_conversation.set(5, true);
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.begin(&mut relay);
        assert!(relay.ps_gateway_conversation.is_zero());
        assert!(!relay.gateway_conversation_update);
        assert_eq!(gm.state, GmState::Initialize);
    }

    #[test]
    fn test_priority_selection_prefers_first_enabled_system() {
        let mut relay = two_system_relay();
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);
        // both systems enable conversation 100; system 1 is listed first
        assert_eq!(relay.gateway_conversation[100], Some(ps(1)));
        // every IPP now owes its own pass
        assert!(relay.ipp_all_gateway_update());
        assert_eq!(gm.state, GmState::DrniGatewayUpdate);
    }

    #[test]
    fn test_failover_to_second_preference() {
        let mut relay = two_system_relay();
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);
        assert_eq!(relay.gateway_conversation[100], Some(ps(1)));

        // system 1's gateway can no longer pass conversation 100
        relay.home_gateway_vector.set(100, false);
        relay.gateway_conversation_update = true;
        gm.run(&mut relay);
        assert_eq!(relay.gateway_conversation[100], Some(ps(2)));
    }

    #[test]
    fn test_unlisted_conversation_has_no_owner() {
        let mut relay = two_system_relay();
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);
        assert_eq!(relay.gateway_conversation[99], None);
    }

    #[test]
    fn test_ps_pass_waits_for_ipps() {
        let mut relay = two_system_relay();
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);
        assert_eq!(gm.state, GmState::DrniGatewayUpdate);

        // the IPP finished its recomputation
        relay.ipp_gateway_update.insert(IppId(1), false);
        gm.run(&mut relay);
        assert_eq!(gm.state, GmState::PsGatewayUpdate);
        // home (system 1) owns conversation 100
        assert!(relay.ps_gateway_conversation.get(100));
        assert!(!relay.ps_gateway_conversation.get(99));
    }

    #[test]
    fn test_exactly_one_system_per_conversation() {
        let mut relay = two_system_relay();
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);

        let owner = relay.gateway_conversation[100].unwrap();
        let owners = (1..=3u8)
            .filter(|n| {
                relay.portal_system_state[ps(*n).index()]
                    .gateway_vector
                    .get(100)
                    && relay.gateway_conversation[100] == Some(ps(*n))
            })
            .count();
        assert_eq!(owners, 1);
        assert_eq!(owner, ps(1));
    }

    #[test]
    fn test_digest_disagreement_defers_to_neighbor_claim() {
        let mut relay = two_system_relay();
        {
            let record = relay.neighbors.get_mut(&IppId(1)).unwrap();
            record.differ_gateway_digest = true;
        }
        relay.gateway_conversation_update = true;
        let mut gm = GatewayMachine::new();
        gm.run(&mut relay);
        relay.ipp_gateway_update.insert(IppId(1), false);
        gm.run(&mut relay);
        // the neighbour claims 100; home backs off to avoid a duplicate gateway
        assert!(!relay.ps_gateway_conversation.get(100));
    }
}
