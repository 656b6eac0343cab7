//! DRCP Transmit machine (802.1AX-2014 clause 9.4.19)
//!
//! On/Off with an unconditional fall-through back to Off: each NTT builds
//! one DRCPDU, or two when both conversation vectors must go out and the
//! portal does not use common methods (each vector travels in its own PDU).
//! A PDU that would exceed the egress MTU is dropped with a diagnostic and
//! NTT stays set; it is never truncated.

use super::ipp::{Ipp, IppStatic};
use linkagg_packet::{Drcpdu, HomePortsInfoTlv, NetworkIplEncapsulationTlv, PortalConfigInfoTlv, PortalInfoTlv};
use std::fmt;
use tracing::{debug, warn};

const ETHERNET_HEADER_LEN: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TxmState {
    #[default]
    Off,
    On,
}

impl fmt::Display for TxmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TxmState::Off => "Off",
            TxmState::On => "On",
        })
    }
}

#[derive(Debug, Default)]
pub struct DrcpTxMachine {
    pub state: TxmState,
}

impl DrcpTxMachine {
    pub fn new() -> Self {
        Self {
            state: TxmState::Off,
        }
    }

    /// Serve a pending NTT. Returns the PDUs that fit the MTU; oversize
    /// ones are dropped and leave NTT set for the next attempt.
    pub fn on_ntt(&mut self, ipp: &mut Ipp, stat: &IppStatic, mtu: usize) -> Vec<Drcpdu> {
        if !ipp.ntt || !ipp.drcp_enabled || !ipp.enabled {
            return Vec::new();
        }
        self.state = TxmState::On;

        let mut out = Vec::new();
        let mut dropped = false;
        for (pdu, carries_gateway, carries_port) in self.build_pdus(ipp, stat) {
            let frame_len = pdu.wire_len() + ETHERNET_HEADER_LEN;
            if frame_len > mtu {
                ipp.counters.tx_oversize_dropped += 1;
                dropped = true;
                warn!(
                    ipp = %ipp.id,
                    frame_len,
                    mtu,
                    "DRCPDU exceeds egress MTU, dropping instead of truncating"
                );
                continue;
            }
            if carries_gateway {
                ipp.gateway_conversation_transmit = false;
            }
            if carries_port {
                ipp.port_conversation_transmit = false;
            }
            out.push(pdu);
        }

        // NTT survives a drop so a later, smaller build can be retried
        ipp.ntt = dropped;
        // unconditional fall-through
        self.state = TxmState::Off;
        out
    }

    /// Assemble the PDU set for the current transmit flags. Each entry is
    /// tagged with the vectors it carries.
    fn build_pdus(&self, ipp: &Ipp, stat: &IppStatic) -> Vec<(Drcpdu, bool, bool)> {
        let gateway = ipp.gateway_conversation_transmit;
        let port = ipp.port_conversation_transmit;

        if stat.three_system_portal {
            // three-portal conversation vector TLVs are not emitted
            debug!(ipp = %ipp.id, "three-system portal: conversation vectors suppressed");
            return vec![(self.base_pdu(ipp, stat), false, false)];
        }

        if gateway && port && !stat.common_methods {
            let mut first = self.base_pdu(ipp, stat);
            first.gateway_vector = Some(ipp.gateway_vector_tx.clone());
            let mut second = self.base_pdu(ipp, stat);
            second.port_vector = Some(ipp.port_vector_tx.clone());
            return vec![(first, true, false), (second, false, true)];
        }

        let mut pdu = self.base_pdu(ipp, stat);
        if gateway && port {
            // common methods: the port vector stands for both maps
            pdu.port_vector = Some(ipp.port_vector_tx.clone());
            vec![(pdu, true, true)]
        } else if gateway {
            pdu.gateway_vector = Some(ipp.gateway_vector_tx.clone());
            vec![(pdu, true, false)]
        } else if port {
            pdu.port_vector = Some(ipp.port_vector_tx.clone());
            vec![(pdu, false, true)]
        } else {
            vec![(pdu, false, false)]
        }
    }

    fn base_pdu(&self, ipp: &Ipp, stat: &IppStatic) -> Drcpdu {
        let mut pdu = Drcpdu::new(
            PortalInfoTlv {
                aggregator_priority: stat.aggregator_priority,
                aggregator_id: stat.aggregator_id,
                portal_priority: stat.portal_priority,
                portal_addr: stat.portal_addr,
            },
            PortalConfigInfoTlv {
                topology_state: stat.topology_state(),
                oper_aggregator_key: stat.oper_aggregator_key,
                port_algorithm: stat.port_algorithm,
                gateway_algorithm: stat.gateway_algorithm,
                port_digest: stat.port_digest,
                gateway_digest: stat.gateway_digest,
            },
            ipp.home_state,
            HomePortsInfoTlv {
                admin_aggregator_key: stat.oper_aggregator_key,
                oper_partner_aggregator_key: ipp
                    .neighbor
                    .as_ref()
                    .map(|n| n.oper_aggregator_key)
                    .unwrap_or(0),
                active_ports: ipp.home_active_ports.clone(),
            },
        );
        if let Some(method) = stat.ipl_sharing_method {
            pdu.ipl_method = Some(method);
            pdu.ipl_encapsulation = Some(NetworkIplEncapsulationTlv::default());
        }
        pdu
    }
}
