//! LACP Periodic Transmission machine (802.1AX-2014 clause 6.4.13)
//!
//! Maintains the heartbeat toward the partner: fast (1 s) while the partner
//! asks for short timeouts, slow (30 s) otherwise, and silent while neither
//! end is active or the port is down. `PeriodicTx` is transient: the timer
//! fire raises NTT and the machine immediately re-enters the interval state
//! matching the partner's timeout preference.

use super::port::AggPort;
use super::{constants::*, Action};
use linkagg_core::Deadline;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodicState {
    NoPeriodic,
    FastPeriodic,
    SlowPeriodic,
    /// Transient: never rests here between events
    PeriodicTx,
}

impl fmt::Display for PeriodicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeriodicState::NoPeriodic => "NoPeriodic",
            PeriodicState::FastPeriodic => "FastPeriodic",
            PeriodicState::SlowPeriodic => "SlowPeriodic",
            PeriodicState::PeriodicTx => "PeriodicTx",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct PeriodicMachine {
    pub state: PeriodicState,
    pub timer: Deadline,
}

impl Default for PeriodicMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PeriodicMachine {
    pub fn new() -> Self {
        Self {
            state: PeriodicState::NoPeriodic,
            timer: Deadline::new(),
        }
    }

    fn no_periodic_gate(port: &AggPort) -> bool {
        !port.lacp_enabled
            || !port.port_enabled
            || (!port.actor_oper.state.activity() && !port.partner_oper.state.activity())
    }

    /// Re-derive the state from the port's gating conditions. Called after
    /// Begin and after any event that may have changed them.
    pub fn recheck(&mut self, port: &AggPort) {
        let prev = self.state;
        if Self::no_periodic_gate(port) {
            if self.state != PeriodicState::NoPeriodic {
                self.timer.stop();
                self.state = PeriodicState::NoPeriodic;
            }
        } else {
            match self.state {
                // unconditional fall-through out of NoPeriodic
                PeriodicState::NoPeriodic => self.enter_fast(),
                PeriodicState::FastPeriodic if !port.partner_oper.state.short_timeout() => {
                    self.enter_slow()
                }
                PeriodicState::SlowPeriodic if port.partner_oper.state.short_timeout() => {
                    // the partner turned impatient: transmit now
                    self.state = PeriodicState::PeriodicTx;
                }
                _ => {}
            }
        }
        if self.state != prev {
            debug!(port = %port.id, from = %prev, to = %self.state, "ptxm transition");
        }
    }

    /// Handle the periodic timer firing; returns the actions to run
    pub fn on_timer(&mut self, port: &AggPort) -> Vec<Action> {
        if matches!(
            self.state,
            PeriodicState::FastPeriodic | PeriodicState::SlowPeriodic
        ) {
            self.state = PeriodicState::PeriodicTx;
        } else {
            self.timer.stop();
            return Vec::new();
        }
        self.leave_periodic_tx(port);
        vec![Action::Ntt]
    }

    /// Resolve the transient PeriodicTx into the interval state matching
    /// the partner's timeout preference
    fn leave_periodic_tx(&mut self, port: &AggPort) {
        if port.partner_oper.state.short_timeout() {
            self.enter_fast();
        } else {
            self.enter_slow();
        }
    }

    /// Settle a PeriodicTx entered from recheck (slow → short flip)
    pub fn settle(&mut self, port: &AggPort) -> Vec<Action> {
        if self.state == PeriodicState::PeriodicTx {
            self.leave_periodic_tx(port);
            return vec![Action::Ntt];
        }
        Vec::new()
    }

    fn enter_fast(&mut self) {
        self.timer.start(FAST_PERIODIC_TIME);
        self.state = PeriodicState::FastPeriodic;
    }

    fn enter_slow(&mut self) {
        self.timer.start(SLOW_PERIODIC_TIME);
        self.state = PeriodicState::SlowPeriodic;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lacp::port::test_config;
    use linkagg_core::LacpMode;
    use linkagg_packet::LacpState;

    fn enabled_port(mode: LacpMode) -> AggPort {
        let mut port = AggPort::new(&test_config(1, mode), true);
        port.port_enabled = true;
        port
    }

    #[test]
    fn test_disabled_port_stays_no_periodic() {
        let port = AggPort::new(&test_config(1, LacpMode::Active), true);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::NoPeriodic);
        assert!(!ptxm.timer.is_running());
    }

    #[test]
    fn test_active_port_falls_through_to_fast() {
        let port = enabled_port(LacpMode::Active);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::FastPeriodic);
        assert!(ptxm.timer.is_running());
    }

    #[test]
    fn test_passive_passive_stays_no_periodic() {
        // neither we nor the recorded partner is active
        let port = enabled_port(LacpMode::Passive);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::NoPeriodic);
    }

    #[test]
    fn test_passive_with_active_partner_runs() {
        let mut port = enabled_port(LacpMode::Passive);
        port.partner_oper.state.set(LacpState::ACTIVITY | LacpState::TIMEOUT);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::FastPeriodic);
    }

    #[test]
    fn test_timer_fire_raises_ntt_and_rearms() {
        let mut port = enabled_port(LacpMode::Active);
        port.partner_oper.state.set(LacpState::TIMEOUT);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        let actions = ptxm.on_timer(&port);
        assert_eq!(actions, vec![Action::Ntt]);
        assert_eq!(ptxm.state, PeriodicState::FastPeriodic);
        assert!(ptxm.timer.is_running());
    }

    #[test]
    fn test_partner_long_timeout_slows_interval() {
        let mut port = enabled_port(LacpMode::Active);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::FastPeriodic);

        port.partner_oper.state.clear(LacpState::TIMEOUT);
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::SlowPeriodic);
    }

    #[test]
    fn test_partner_short_flip_transmits_immediately() {
        let mut port = enabled_port(LacpMode::Active);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        port.partner_oper.state.clear(LacpState::TIMEOUT);
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::SlowPeriodic);

        port.partner_oper.state.set(LacpState::TIMEOUT);
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::PeriodicTx);
        let actions = ptxm.settle(&port);
        assert_eq!(actions, vec![Action::Ntt]);
        assert_eq!(ptxm.state, PeriodicState::FastPeriodic);
    }

    #[test]
    fn test_port_down_stops_heartbeat() {
        let mut port = enabled_port(LacpMode::Active);
        let mut ptxm = PeriodicMachine::new();
        ptxm.recheck(&port);
        port.port_enabled = false;
        ptxm.recheck(&port);
        assert_eq!(ptxm.state, PeriodicState::NoPeriodic);
        assert!(!ptxm.timer.is_running());
    }
}
