//! DRCP Receive machine (802.1AX-2014 clause 9.4.14)
//!
//! Accepts validated DRCPDUs on one IPP, maintains the neighbour record,
//! and decides which portal-wide recomputations the PDU implies. The
//! current-while timer declares the neighbour absent when it goes silent.

use super::constants::*;
use super::ipp::{Ipp, IppStatic};
use super::relay::NeighborRecord;
use super::DrniAction;
use linkagg_core::Deadline;
use linkagg_packet::{DrcpState, Drcpdu};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct DrcpRxMachine {
    pub current_while: Deadline,
}

impl DrcpRxMachine {
    pub fn new() -> Self {
        Self {
            current_while: Deadline::new(),
        }
    }

    /// Process one accepted DRCPDU. Returns the recomputation and transmit
    /// actions it implies.
    pub fn on_pdu(&mut self, ipp: &mut Ipp, stat: &IppStatic, pdu: &Drcpdu) -> Vec<DrniAction> {
        if pdu.portal_info.portal_addr != stat.portal_addr {
            warn!(
                ipp = %ipp.id,
                theirs = %pdu.portal_info.portal_addr,
                ours = %stat.portal_addr,
                "DRCPDU from a foreign portal, dropping"
            );
            ipp.counters.rx_bad_pdu += 1;
            return Vec::new();
        }
        let neighbor_psn = pdu.portal_config.topology_state.portal_system_number();
        if neighbor_psn != ipp.neighbor_system_number.get() {
            warn!(
                ipp = %ipp.id,
                got = neighbor_psn,
                expected = ipp.neighbor_system_number.get(),
                "unexpected neighbour portal system number, dropping"
            );
            ipp.counters.rx_bad_pdu += 1;
            return Vec::new();
        }

        let differ_gateway_digest = pdu.portal_config.gateway_digest != stat.gateway_digest
            || pdu.portal_config.gateway_algorithm != stat.gateway_algorithm;
        let differ_port_digest = pdu.portal_config.port_digest != stat.port_digest
            || pdu.portal_config.port_algorithm != stat.port_algorithm;
        if differ_gateway_digest || differ_port_digest {
            debug!(ipp = %ipp.id, "neighbour conversation digests differ from ours");
        }

        let mut record = NeighborRecord {
            system_number: ipp.neighbor_system_number,
            state: pdu.state,
            oper_aggregator_key: pdu.portal_config.oper_aggregator_key,
            gateway_vector: pdu.gateway_vector.clone(),
            port_vector: pdu.port_vector.clone(),
            active_ports: pdu.home_ports.active_ports.clone(),
            differ_gateway_digest,
            differ_port_digest,
        };
        // a PDU without vector TLVs leaves the learned vectors in place;
        // withdrawing a vector means transmitting it all-zero
        if let Some(old) = &ipp.neighbor {
            if record.gateway_vector.is_none() {
                record.gateway_vector = old.gateway_vector.clone();
            }
            if record.port_vector.is_none() {
                record.port_vector = old.port_vector.clone();
            }
        }

        let mut actions = Vec::new();
        match &ipp.neighbor {
            None => {
                // first contact: everything needs recomputing and the
                // neighbour needs to hear from us
                actions.push(DrniAction::NeighborChanged);
                actions.push(DrniAction::GatewayUpdate);
                actions.push(DrniAction::PortUpdate);
                actions.push(DrniAction::Ntt);
            }
            Some(old) => {
                let gateway_changed = old.gateway_vector != record.gateway_vector
                    || old.differ_gateway_digest != record.differ_gateway_digest;
                let port_changed = old.port_vector != record.port_vector
                    || old.active_ports != record.active_ports
                    || old.oper_aggregator_key != record.oper_aggregator_key
                    || old.differ_port_digest != record.differ_port_digest;
                if gateway_changed || port_changed {
                    actions.push(DrniAction::NeighborChanged);
                }
                if gateway_changed {
                    actions.push(DrniAction::GatewayUpdate);
                }
                if port_changed {
                    actions.push(DrniAction::PortUpdate);
                }
            }
        }

        let timeout = if record.state.short_timeout() {
            DRCP_SHORT_TIMEOUT_TIME
        } else {
            DRCP_LONG_TIMEOUT_TIME
        };
        self.current_while.start(timeout);
        ipp.neighbor = Some(record);
        ipp.home_state.clear(DrcpState::EXPIRED);

        actions
    }

    /// The current-while timer fired: the neighbour is gone
    pub fn on_expiry(&mut self, ipp: &mut Ipp) -> Vec<DrniAction> {
        self.current_while.stop();
        if ipp.neighbor.is_none() {
            return Vec::new();
        }
        warn!(ipp = %ipp.id, "neighbour DRCP timed out, clearing its state");
        ipp.reset_neighbor();
        vec![
            DrniAction::NeighborGone,
            DrniAction::GatewayUpdate,
            DrniAction::PortUpdate,
            DrniAction::Ntt,
        ]
    }
}
