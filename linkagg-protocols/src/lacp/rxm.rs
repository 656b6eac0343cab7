//! LACP Receive machine (802.1AX-2014 clause 6.4.12)
//!
//! Validated LACPDUs, current-while expiry, and port enable/disable drive
//! this machine through Initialize, PortDisabled, Expired, LacpDisabled,
//! Defaulted, and Current. The Initialize pass-through and the
//! condition-gated exits from PortDisabled are folded into event handling as
//! epsilon transitions rather than re-queued events.

use super::info::{info_equal, same_partner};
use super::port::{AggPort, Selected};
use super::{constants::*, Action};
use linkagg_core::Deadline;
use linkagg_packet::{LacpState, Lacpdu, LACP_VERSION};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RxState {
    Initialize,
    PortDisabled,
    Expired,
    LacpDisabled,
    Defaulted,
    Current,
}

impl fmt::Display for RxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RxState::Initialize => "Initialize",
            RxState::PortDisabled => "PortDisabled",
            RxState::Expired => "Expired",
            RxState::LacpDisabled => "LacpDisabled",
            RxState::Defaulted => "Defaulted",
            RxState::Current => "Current",
        };
        f.write_str(s)
    }
}

/// Inputs of the Receive machine
#[derive(Debug)]
pub enum RxEvent {
    Begin,
    /// `port_enabled` or `lacp_enabled` changed; the machine re-derives
    PortStateChanged,
    PortMoved,
    CurrentWhileExpired,
    Pdu(Box<Lacpdu>),
}

#[derive(Debug)]
pub struct RxMachine {
    pub state: RxState,
    pub current_while: Deadline,
}

impl Default for RxMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RxMachine {
    pub fn new() -> Self {
        Self {
            state: RxState::Initialize,
            current_while: Deadline::new(),
        }
    }

    /// Process one event, mutating the port record and returning actions
    /// for the task loop
    pub fn step(&mut self, port: &mut AggPort, event: RxEvent) -> Vec<Action> {
        let mut actions = Vec::new();
        let prev = self.state;

        match event {
            RxEvent::Begin => {
                self.enter_initialize(port);
            }
            RxEvent::PortMoved => {
                if self.state == RxState::PortDisabled {
                    port.port_moved = true;
                    self.enter_initialize(port);
                }
            }
            RxEvent::PortStateChanged => {
                if !port.port_enabled && !port.port_moved && self.state != RxState::Initialize {
                    self.enter_port_disabled(port);
                } else if self.state == RxState::LacpDisabled && port.lacp_enabled {
                    self.enter_port_disabled(port);
                }
            }
            RxEvent::CurrentWhileExpired => match self.state {
                RxState::Current => self.enter_expired(port),
                RxState::Expired => self.enter_defaulted(port),
                _ => self.current_while.stop(),
            },
            RxEvent::Pdu(pdu) => match self.state {
                RxState::Expired | RxState::Defaulted | RxState::Current => {
                    self.enter_current(port, &pdu, &mut actions);
                }
                // a PDU in any other state is ignored
                _ => {}
            },
        }

        // epsilon transitions: PortDisabled exits when the port came up
        while self.state == RxState::PortDisabled && port.port_enabled {
            if port.lacp_enabled {
                self.enter_expired(port);
            } else {
                self.enter_lacp_disabled(port);
            }
        }

        if self.state != prev {
            debug!(port = %port.id, from = %prev, to = %self.state, "rxm transition");
        }
        actions
    }

    fn enter_initialize(&mut self, port: &mut AggPort) {
        // detach from the aggregator; the mux machine unwinds on recheck
        port.selected = Selected::Unselected;
        port.reset_oper();
        port.actor_oper.state.clear(LacpState::EXPIRED);
        port.port_moved = false;
        self.current_while.stop();
        self.state = RxState::Initialize;
        // unconditional pass-through
        self.enter_port_disabled(port);
    }

    fn enter_port_disabled(&mut self, port: &mut AggPort) {
        port.partner_oper.state.clear(LacpState::SYNC);
        self.current_while.stop();
        self.state = RxState::PortDisabled;
    }

    fn enter_expired(&mut self, port: &mut AggPort) {
        port.partner_oper.state.clear(LacpState::SYNC);
        port.partner_oper.state.set(LacpState::TIMEOUT);
        self.current_while.start(SHORT_TIMEOUT_TIME);
        port.actor_oper.state.set(LacpState::EXPIRED);
        self.state = RxState::Expired;
    }

    fn enter_lacp_disabled(&mut self, port: &mut AggPort) {
        port.selected = Selected::Unselected;
        self.record_default(port);
        port.partner_oper.state.clear(LacpState::AGGREGATION);
        port.actor_oper.state.clear(LacpState::EXPIRED);
        self.current_while.stop();
        self.state = RxState::LacpDisabled;
    }

    fn enter_defaulted(&mut self, port: &mut AggPort) {
        self.update_default_selected(port);
        self.record_default(port);
        port.actor_oper.state.clear(LacpState::EXPIRED);
        self.current_while.stop();
        self.state = RxState::Defaulted;
    }

    fn enter_current(&mut self, port: &mut AggPort, pdu: &Lacpdu, actions: &mut Vec<Action>) {
        self.update_selected(port, pdu);
        let ntt = self.update_ntt(port, pdu);
        const SUPPORTS_V2: bool = LACP_VERSION >= 0x02;
        if SUPPORTS_V2 {
            self.record_version_number(port, pdu);
        }
        self.record_pdu(port, pdu);

        let timeout = if port.partner_oper.state.short_timeout() {
            SHORT_TIMEOUT_TIME
        } else {
            LONG_TIMEOUT_TIME
        };
        self.current_while.start(timeout);
        port.actor_oper.state.clear(LacpState::EXPIRED);
        self.state = RxState::Current;

        // the partner is current; Selection may (re)run on this information
        actions.push(Action::RunSelection);
        if ntt {
            actions.push(Action::Ntt);
        }
    }

    /// Record the PDU's actor information as our partner operational
    /// parameters and derive the partner Sync state (clause 6.4.9)
    pub fn record_pdu(&mut self, port: &mut AggPort, pdu: &Lacpdu) {
        port.partner_oper = pdu.actor;
        port.actor_oper.state.clear(LacpState::DEFAULTED);

        let matches_us = same_partner(&pdu.partner, &port.actor_oper)
            && pdu.actor.state.sync();
        let individual = !pdu.actor.state.aggregation() && pdu.actor.state.sync();
        let active_exchange = pdu.actor.state.activity()
            || (port.actor_oper.state.activity() && pdu.partner.state.activity());

        if (matches_us || individual) && active_exchange {
            port.partner_oper.state.set(LacpState::SYNC);
        } else {
            port.partner_oper.state.clear(LacpState::SYNC);
        }
    }

    /// Adopt the administrative partner parameters (clause 6.4.9)
    pub fn record_default(&mut self, port: &mut AggPort) {
        port.partner_oper = port.partner_admin;
        port.actor_oper.state.set(LacpState::DEFAULTED);
        port.partner_oper.state.set(LacpState::SYNC);
    }

    /// Drop the selection when the PDU's actor no longer matches the
    /// recorded partner (clause 6.4.9)
    fn update_selected(&mut self, port: &mut AggPort, pdu: &Lacpdu) {
        if !same_partner(&pdu.actor, &port.partner_oper) {
            port.selected = Selected::Unselected;
        }
    }

    /// Drop the selection when the administrative partner no longer matches
    /// the recorded partner
    fn update_default_selected(&mut self, port: &mut AggPort) {
        if !same_partner(&port.partner_admin, &port.partner_oper) {
            port.selected = Selected::Unselected;
        }
    }

    /// The partner's view of us is stale when its partner block disagrees
    /// with our operational actor block
    fn update_ntt(&self, port: &AggPort, pdu: &Lacpdu) -> bool {
        const NTT_STATE: u8 = LacpState::ACTIVITY
            | LacpState::TIMEOUT
            | LacpState::AGGREGATION
            | LacpState::SYNC;
        !info_equal(&pdu.partner, &port.actor_oper, NTT_STATE)
    }

    pub fn record_version_number(&mut self, port: &mut AggPort, pdu: &Lacpdu) {
        port.partner_version = pdu.version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lacp::port::test_config;
    use linkagg_core::{LacpMode, MacAddr, PortId, SystemId};
    use linkagg_packet::PduPortInfo;

    fn port_up(mode: LacpMode) -> (AggPort, RxMachine) {
        let mut port = AggPort::new(&test_config(1, mode), true);
        let mut rxm = RxMachine::new();
        rxm.step(&mut port, RxEvent::Begin);
        port.port_enabled = true;
        rxm.step(&mut port, RxEvent::PortStateChanged);
        (port, rxm)
    }

    fn peer_info(port_num: u16, state: u8) -> PduPortInfo {
        PduPortInfo {
            system: SystemId::new(0x8000, MacAddr([0xBB, 0, 0, 0, 0, 0x02])),
            key: 20,
            port_priority: 0x8000,
            port: PortId(port_num),
            state: LacpState(state),
        }
    }

    fn pdu_from_peer(port: &AggPort, actor_state: u8) -> Lacpdu {
        // a fully converged peer: its partner block mirrors our actor oper
        Lacpdu::new(peer_info(7, actor_state), port.actor_oper)
    }

    #[test]
    fn test_begin_lands_in_port_disabled_when_down() {
        let mut port = AggPort::new(&test_config(1, LacpMode::Active), true);
        let mut rxm = RxMachine::new();
        rxm.step(&mut port, RxEvent::Begin);
        assert_eq!(rxm.state, RxState::PortDisabled);
        assert!(!port.partner_oper.state.sync());
    }

    #[test]
    fn test_port_up_enters_expired() {
        let (port, rxm) = port_up(LacpMode::Active);
        assert_eq!(rxm.state, RxState::Expired);
        assert!(port.actor_oper.state.expired());
        assert!(port.partner_oper.state.short_timeout());
        assert!(rxm.current_while.is_running());
    }

    #[test]
    fn test_port_up_lacp_disabled_enters_lacp_disabled() {
        let (port, rxm) = port_up(LacpMode::On);
        assert_eq!(rxm.state, RxState::LacpDisabled);
        assert!(port.actor_oper.state.defaulted());
        assert!(!port.partner_oper.state.aggregation());
        assert_eq!(port.selected, Selected::Unselected);
    }

    #[test]
    fn test_pdu_moves_expired_to_current() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY | LacpState::AGGREGATION);
        let actions = rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert_eq!(rxm.state, RxState::Current);
        assert!(!port.actor_oper.state.expired());
        assert_eq!(port.partner_oper.port, PortId(7));
        assert!(actions.contains(&Action::RunSelection));
    }

    #[test]
    fn test_record_pdu_sync_when_peer_current_and_in_sync() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(
            &port,
            LacpState::ACTIVITY | LacpState::AGGREGATION | LacpState::SYNC,
        );
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert!(port.partner_oper.state.sync());
    }

    #[test]
    fn test_record_pdu_no_sync_when_peer_view_stale() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        // peer claims sync but still carries default partner info
        let pdu = Lacpdu::new(
            peer_info(7, LacpState::ACTIVITY | LacpState::AGGREGATION | LacpState::SYNC),
            PduPortInfo::default(),
        );
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert!(!port.partner_oper.state.sync());
    }

    #[test]
    fn test_record_pdu_individual_link_sync() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        // aggregation clear + sync set: an individual link is in sync
        let pdu = Lacpdu::new(
            peer_info(7, LacpState::ACTIVITY | LacpState::SYNC),
            PduPortInfo::default(),
        );
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert!(port.partner_oper.state.sync());
    }

    #[test]
    fn test_record_pdu_idempotent() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(
            &port,
            LacpState::ACTIVITY | LacpState::AGGREGATION | LacpState::SYNC,
        );
        rxm.record_pdu(&mut port, &pdu);
        let first = port.partner_oper;
        rxm.record_pdu(&mut port, &pdu);
        assert_eq!(port.partner_oper, first);
    }

    #[test]
    fn test_current_while_expiry_cascade() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY | LacpState::AGGREGATION);
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert_eq!(rxm.state, RxState::Current);

        rxm.step(&mut port, RxEvent::CurrentWhileExpired);
        assert_eq!(rxm.state, RxState::Expired);
        assert!(port.actor_oper.state.expired());
        assert!(!port.partner_oper.state.sync());

        rxm.step(&mut port, RxEvent::CurrentWhileExpired);
        assert_eq!(rxm.state, RxState::Defaulted);
        assert!(port.actor_oper.state.defaulted());
        // defaulted and expired are never both set
        assert!(!port.actor_oper.state.expired());
        // administrative partner adopted, declared in sync
        assert_eq!(port.partner_oper.key, port.partner_admin.key);
        assert!(port.partner_oper.state.sync());
    }

    #[test]
    fn test_updated_partner_identity_unselects() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY | LacpState::AGGREGATION);
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        port.selected = Selected::Selected;

        // same peer, new key: selection must be dropped
        let mut moved = peer_info(7, LacpState::ACTIVITY | LacpState::AGGREGATION);
        moved.key = 99;
        let pdu = Lacpdu::new(moved, port.actor_oper);
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert_eq!(port.selected, Selected::Unselected);
    }

    #[test]
    fn test_ntt_raised_when_peer_view_stale() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = Lacpdu::new(
            peer_info(7, LacpState::ACTIVITY | LacpState::AGGREGATION),
            PduPortInfo::default(),
        );
        let actions = rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert!(actions.contains(&Action::Ntt));

        // an accurate partner block raises no ntt
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY | LacpState::AGGREGATION);
        let actions = rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert!(!actions.contains(&Action::Ntt));
    }

    #[test]
    fn test_port_down_returns_to_port_disabled() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY | LacpState::AGGREGATION);
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));

        port.port_enabled = false;
        rxm.step(&mut port, RxEvent::PortStateChanged);
        assert_eq!(rxm.state, RxState::PortDisabled);
        assert!(!port.partner_oper.state.sync());
        assert!(!rxm.current_while.is_running());
    }

    #[test]
    fn test_port_moved_reinitializes() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        port.port_enabled = false;
        rxm.step(&mut port, RxEvent::PortStateChanged);
        assert_eq!(rxm.state, RxState::PortDisabled);

        rxm.step(&mut port, RxEvent::PortMoved);
        // initialize clears the flag and falls through to PortDisabled
        assert!(!port.port_moved);
        assert_eq!(rxm.state, RxState::PortDisabled);
    }

    #[test]
    fn test_pdu_ignored_in_port_disabled() {
        let mut port = AggPort::new(&test_config(1, LacpMode::Active), true);
        let mut rxm = RxMachine::new();
        rxm.step(&mut port, RxEvent::Begin);
        let pdu = pdu_from_peer(&port, LacpState::ACTIVITY);
        rxm.step(&mut port, RxEvent::Pdu(Box::new(pdu)));
        assert_eq!(rxm.state, RxState::PortDisabled);
        assert_eq!(port.partner_oper.port, PortId(0));
    }

    #[test]
    fn test_record_version_number() {
        let (mut port, mut rxm) = port_up(LacpMode::Active);
        let mut pdu = pdu_from_peer(&port, LacpState::ACTIVITY);
        pdu.version = 2;
        rxm.record_version_number(&mut port, &pdu);
        assert_eq!(port.partner_version, 2);
    }
}
