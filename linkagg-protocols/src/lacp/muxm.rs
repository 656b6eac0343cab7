//! LACP Mux machine (802.1AX-2014 clause 6.4.15, coupled control)
//!
//! Walks a port from Detached through Waiting and Attached into the
//! collecting/distributing path as Selection and the partner's Sync and
//! Collecting bits allow, and unwinds the same path immediately when any of
//! them is lost. The machine never retries a lost selection itself; it
//! parks in Detached until Selection assigns the port again.

use super::port::{AggPort, Selected};
use super::{constants::*, Action};
use linkagg_core::Deadline;
use linkagg_packet::LacpState;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxState {
    Detached,
    Waiting,
    Attached,
    Collecting,
    /// Collecting and Distributing as one coupled state
    CollectingDistributing,
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MuxState::Detached => "Detached",
            MuxState::Waiting => "Waiting",
            MuxState::Attached => "Attached",
            MuxState::Collecting => "Collecting",
            MuxState::CollectingDistributing => "CollectingDistributing",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct MuxMachine {
    pub state: MuxState,
    pub wait_while: Deadline,
    wait_done: bool,
}

impl Default for MuxMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl MuxMachine {
    pub fn new() -> Self {
        Self {
            state: MuxState::Detached,
            wait_while: Deadline::new(),
            wait_done: false,
        }
    }

    pub fn begin(&mut self, port: &mut AggPort) {
        self.enter_detached(port, &mut Vec::new());
    }

    /// The wait-while timer elapsed; readiness still depends on the rest of
    /// the selection group
    pub fn wait_elapsed(&mut self) {
        self.wait_while.stop();
        self.wait_done = true;
    }

    pub fn is_waiting_done(&self) -> bool {
        self.state == MuxState::Waiting && self.wait_done
    }

    /// Attach if this port finished waiting and the whole selection group
    /// is ready
    pub fn try_attach(&mut self, port: &mut AggPort, group_ready: bool) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.is_waiting_done() && group_ready && port.selected == Selected::Selected {
            self.enter_attached(port, &mut actions);
            self.recheck_inner(port, &mut actions);
        }
        actions
    }

    /// Re-derive the state from `selected` and the partner's Sync and
    /// Collecting bits
    pub fn recheck(&mut self, port: &mut AggPort) -> Vec<Action> {
        let mut actions = Vec::new();
        let prev = self.state;
        self.recheck_inner(port, &mut actions);
        if self.state != prev {
            debug!(port = %port.id, from = %prev, to = %self.state, "muxm transition");
        }
        actions
    }

    fn recheck_inner(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        loop {
            let selected = port.selected == Selected::Selected;
            match self.state {
                MuxState::Detached => {
                    if selected && port.assigned_agg.is_some() {
                        self.enter_waiting();
                        continue;
                    }
                }
                MuxState::Waiting => {
                    if !selected {
                        self.enter_detached(port, actions);
                        continue;
                    }
                    // attach happens through try_attach once the group is ready
                }
                MuxState::Attached => {
                    if !selected {
                        self.enter_detached(port, actions);
                        continue;
                    }
                    if port.partner_oper.state.sync() {
                        self.enter_collecting(port, actions);
                        continue;
                    }
                }
                MuxState::Collecting => {
                    if !selected || !port.partner_oper.state.sync() {
                        self.fall_back_to_attached(port, actions);
                        continue;
                    }
                    if port.partner_oper.state.collecting() {
                        self.enter_collecting_distributing(port, actions);
                        continue;
                    }
                }
                MuxState::CollectingDistributing => {
                    if !selected || !port.partner_oper.state.sync() {
                        self.fall_back_to_attached(port, actions);
                        continue;
                    }
                    if !port.partner_oper.state.collecting() {
                        self.enter_collecting(port, actions);
                        continue;
                    }
                }
            }
            break;
        }
    }

    fn enter_detached(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        let was_attached = port.agg_id.is_some();
        port.agg_id = None;
        port.actor_oper
            .state
            .clear(LacpState::SYNC | LacpState::COLLECTING | LacpState::DISTRIBUTING);
        self.wait_while.stop();
        self.wait_done = false;
        self.state = MuxState::Detached;
        if was_attached {
            actions.push(Action::Ntt);
        }
    }

    fn enter_waiting(&mut self) {
        self.wait_done = false;
        self.wait_while.start(AGGREGATE_WAIT_TIME);
        self.state = MuxState::Waiting;
    }

    fn enter_attached(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        port.agg_id = port.assigned_agg;
        port.actor_oper.state.set(LacpState::SYNC);
        port.actor_oper
            .state
            .clear(LacpState::COLLECTING | LacpState::DISTRIBUTING);
        self.state = MuxState::Attached;
        actions.push(Action::Ntt);
    }

    fn fall_back_to_attached(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        port.actor_oper
            .state
            .clear(LacpState::COLLECTING | LacpState::DISTRIBUTING);
        self.state = MuxState::Attached;
        actions.push(Action::Ntt);
    }

    fn enter_collecting(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        port.actor_oper.state.set(LacpState::COLLECTING);
        port.actor_oper.state.clear(LacpState::DISTRIBUTING);
        self.state = MuxState::Collecting;
        actions.push(Action::Ntt);
    }

    fn enter_collecting_distributing(&mut self, port: &mut AggPort, actions: &mut Vec<Action>) {
        port.actor_oper
            .state
            .set(LacpState::COLLECTING | LacpState::DISTRIBUTING);
        self.state = MuxState::CollectingDistributing;
        actions.push(Action::Ntt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lacp::port::test_config;
    use linkagg_core::{AggregatorId, LacpMode};

    fn selected_port() -> (AggPort, MuxMachine) {
        let mut port = AggPort::new(&test_config(1, LacpMode::Active), true);
        port.port_enabled = true;
        port.selected = Selected::Selected;
        port.assigned_agg = Some(AggregatorId(1));
        let mut muxm = MuxMachine::new();
        muxm.begin(&mut port);
        (port, muxm)
    }

    fn attach(port: &mut AggPort, muxm: &mut MuxMachine) {
        muxm.recheck(port);
        assert_eq!(muxm.state, MuxState::Waiting);
        muxm.wait_elapsed();
        muxm.try_attach(port, true);
    }

    #[test]
    fn test_begin_is_detached() {
        let mut port = AggPort::new(&test_config(1, LacpMode::Active), true);
        let mut muxm = MuxMachine::new();
        muxm.begin(&mut port);
        assert_eq!(muxm.state, MuxState::Detached);
        assert!(port.agg_id.is_none());
    }

    #[test]
    fn test_selected_starts_wait_while() {
        let (mut port, mut muxm) = selected_port();
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Waiting);
        assert!(muxm.wait_while.is_running());
    }

    #[test]
    fn test_attach_after_wait_sets_sync() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        assert_eq!(muxm.state, MuxState::Attached);
        assert_eq!(port.agg_id, Some(AggregatorId(1)));
        assert!(port.actor_oper.state.sync());
        assert!(!port.actor_oper.state.collecting());
    }

    #[test]
    fn test_no_attach_until_group_ready() {
        let (mut port, mut muxm) = selected_port();
        muxm.recheck(&mut port);
        muxm.wait_elapsed();
        muxm.try_attach(&mut port, false);
        assert_eq!(muxm.state, MuxState::Waiting);
    }

    #[test]
    fn test_partner_sync_advances_to_collecting() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        port.partner_oper.state.set(LacpState::SYNC);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Collecting);
        assert!(port.actor_oper.state.collecting());
        assert!(!port.actor_oper.state.distributing());
    }

    #[test]
    fn test_partner_collecting_advances_to_distributing() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        port.partner_oper
            .state
            .set(LacpState::SYNC | LacpState::COLLECTING);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::CollectingDistributing);
        assert!(port.actor_oper.state.collecting());
        assert!(port.actor_oper.state.distributing());
        assert!(port.actor_oper.state.sync());
        assert!(port.agg_id.is_some());
    }

    #[test]
    fn test_sync_loss_unwinds_to_attached() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        port.partner_oper
            .state
            .set(LacpState::SYNC | LacpState::COLLECTING);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::CollectingDistributing);

        port.partner_oper.state.clear(LacpState::SYNC);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Attached);
        assert!(!port.actor_oper.state.distributing());
        assert!(!port.actor_oper.state.collecting());
    }

    #[test]
    fn test_collecting_loss_drops_distributing_only() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        port.partner_oper
            .state
            .set(LacpState::SYNC | LacpState::COLLECTING);
        muxm.recheck(&mut port);

        port.partner_oper.state.clear(LacpState::COLLECTING);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Collecting);
        assert!(port.actor_oper.state.collecting());
        assert!(!port.actor_oper.state.distributing());
    }

    #[test]
    fn test_unselect_detaches_from_any_state() {
        let (mut port, mut muxm) = selected_port();
        attach(&mut port, &mut muxm);
        port.partner_oper
            .state
            .set(LacpState::SYNC | LacpState::COLLECTING);
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::CollectingDistributing);

        port.selected = Selected::Unselected;
        let actions = muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Detached);
        assert!(port.agg_id.is_none());
        assert!(!port.actor_oper.state.sync());
        assert!(actions.contains(&Action::Ntt));
    }

    #[test]
    fn test_unselect_during_waiting_stops_timer() {
        let (mut port, mut muxm) = selected_port();
        muxm.recheck(&mut port);
        assert!(muxm.wait_while.is_running());
        port.selected = Selected::Unselected;
        muxm.recheck(&mut port);
        assert_eq!(muxm.state, MuxState::Detached);
        assert!(!muxm.wait_while.is_running());
    }
}
