//! DRNI Aggregator machine (802.1AX-2014 clause 9.4.17)
//!
//! The port-conversation mirror of the Gateway machine: decides which
//! portal system carries each port conversation ID, restricted to systems
//! that are actually distributing on at least one aggregation port.

use super::relay::DistributedRelay;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmState {
    #[default]
    Initialize,
    DrniPortUpdate,
    PsPortUpdate,
}

impl fmt::Display for AmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AmState::Initialize => "DRNIPortInitialize",
            AmState::DrniPortUpdate => "DRNIPortUpdate",
            AmState::PsPortUpdate => "PsPortUpdate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub struct AggregatorMachine {
    pub state: AmState,
}

impl AggregatorMachine {
    pub fn new() -> Self {
        Self {
            state: AmState::Initialize,
        }
    }

    pub fn begin(&mut self, relay: &mut DistributedRelay) {
        relay.ps_port_conversation.clear_all();
        relay.port_conversation_update = false;
        self.state = AmState::Initialize;
    }

    /// Serve a pending PortConversationUpdate, then fall through to the
    /// per-system pass once every IPP has recomputed
    pub fn run(&mut self, relay: &mut DistributedRelay) {
        while relay.port_conversation_update {
            relay.port_conversation_update = false;
            relay.update_portal_state();
            for flag in relay.ipp_port_update.values_mut() {
                *flag = true;
            }
            Self::set_port_conversation(relay);
            self.state = AmState::DrniPortUpdate;
            debug!(state = %self.state, "port conversation recomputed");
        }
        if self.state == AmState::DrniPortUpdate && !relay.ipp_all_port_update() {
            Self::update_ps_port_conversation(relay);
            self.state = AmState::PsPortUpdate;
        }
    }

    /// Pick the carrying system per conversation ID: the first admin
    /// preference that has active aggregation ports
    fn set_port_conversation(relay: &mut DistributedRelay) {
        for id in 0..relay.port_conversation.len() {
            relay.port_conversation[id] = relay.cfg.conv_admin_port[id]
                .iter()
                .find(|psn| !relay.portal_system_state[psn.index()].active_ports.is_empty())
                .copied();
        }
    }

    fn update_ps_port_conversation(relay: &mut DistributedRelay) {
        let home = relay.home_system_number();
        for id in 0..relay.port_conversation.len() {
            relay
                .ps_port_conversation
                .set(id, relay.port_conversation[id] == Some(home));
        }
        if !relay.cfg.common_methods && !relay.cfg.three_system_portal {
            for record in relay.neighbors.values() {
                if !record.differ_port_digest {
                    continue;
                }
                if let Some(claimed) = &record.port_vector {
                    for id in 0..relay.port_conversation.len() {
                        if claimed.get(id) {
                            relay.ps_port_conversation.set(id, false);
                        }
                    }
                }
            }
        }
    }
}
