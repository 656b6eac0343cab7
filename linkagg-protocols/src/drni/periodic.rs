//! DRCP Periodic Transmission machine (802.1AX-2014 clause 9.4.15)
//!
//! The DRCP heartbeat per IPP, shaped like the LACP periodic machine: fast
//! while the neighbour asks for short timeouts, slow otherwise, silent
//! while DRCP or the link is down.

use super::constants::*;
use super::ipp::Ipp;
use super::DrniAction;
use linkagg_core::Deadline;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrcpPeriodicState {
    NoPeriodic,
    FastPeriodic,
    SlowPeriodic,
}

impl fmt::Display for DrcpPeriodicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DrcpPeriodicState::NoPeriodic => "NoPeriodic",
            DrcpPeriodicState::FastPeriodic => "FastPeriodic",
            DrcpPeriodicState::SlowPeriodic => "SlowPeriodic",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct DrcpPeriodicMachine {
    pub state: DrcpPeriodicState,
    pub timer: Deadline,
}

impl Default for DrcpPeriodicMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DrcpPeriodicMachine {
    pub fn new() -> Self {
        Self {
            state: DrcpPeriodicState::NoPeriodic,
            timer: Deadline::new(),
        }
    }

    fn neighbor_wants_fast(ipp: &Ipp) -> bool {
        match &ipp.neighbor {
            Some(record) => record.state.short_timeout(),
            // until the neighbour speaks, probe at the fast rate
            None => true,
        }
    }

    /// Re-derive the interval from the IPP's gating conditions
    pub fn recheck(&mut self, ipp: &Ipp) {
        let prev = self.state;
        if !ipp.enabled || !ipp.drcp_enabled {
            if self.state != DrcpPeriodicState::NoPeriodic {
                self.timer.stop();
                self.state = DrcpPeriodicState::NoPeriodic;
            }
        } else if Self::neighbor_wants_fast(ipp) {
            if self.state != DrcpPeriodicState::FastPeriodic {
                self.timer.start(DRCP_FAST_PERIODIC_TIME);
                self.state = DrcpPeriodicState::FastPeriodic;
            }
        } else if self.state != DrcpPeriodicState::SlowPeriodic {
            self.timer.start(DRCP_SLOW_PERIODIC_TIME);
            self.state = DrcpPeriodicState::SlowPeriodic;
        }
        if self.state != prev {
            debug!(ipp = %ipp.id, from = %prev, to = %self.state, "drcp periodic transition");
        }
    }

    /// Timer fire: request a DRCPDU and re-arm
    pub fn on_timer(&mut self, ipp: &Ipp) -> Vec<DrniAction> {
        if self.state == DrcpPeriodicState::NoPeriodic {
            self.timer.stop();
            return Vec::new();
        }
        if Self::neighbor_wants_fast(ipp) {
            self.timer.start(DRCP_FAST_PERIODIC_TIME);
            self.state = DrcpPeriodicState::FastPeriodic;
        } else {
            self.timer.start(DRCP_SLOW_PERIODIC_TIME);
            self.state = DrcpPeriodicState::SlowPeriodic;
        }
        vec![DrniAction::Ntt]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkagg_core::{IppId, PortalSystemNumber};

    fn enabled_ipp() -> Ipp {
        let mut ipp = Ipp::new(IppId(1), PortalSystemNumber::new(2).unwrap());
        ipp.enabled = true;
        ipp
    }

    #[test]
    fn test_disabled_ipp_is_silent() {
        let mut ipp = enabled_ipp();
        ipp.enabled = false;
        let mut pm = DrcpPeriodicMachine::new();
        pm.recheck(&ipp);
        assert_eq!(pm.state, DrcpPeriodicState::NoPeriodic);
        assert!(!pm.timer.is_running());
    }

    #[test]
    fn test_no_neighbor_probes_fast() {
        let ipp = enabled_ipp();
        let mut pm = DrcpPeriodicMachine::new();
        pm.recheck(&ipp);
        assert_eq!(pm.state, DrcpPeriodicState::FastPeriodic);
    }

    #[test]
    fn test_timer_fire_requests_drcpdu() {
        let ipp = enabled_ipp();
        let mut pm = DrcpPeriodicMachine::new();
        pm.recheck(&ipp);
        let actions = pm.on_timer(&ipp);
        assert_eq!(actions, vec![DrniAction::Ntt]);
        assert!(pm.timer.is_running());
    }

    #[test]
    fn test_drcp_disabled_stops_timer() {
        let mut ipp = enabled_ipp();
        let mut pm = DrcpPeriodicMachine::new();
        pm.recheck(&ipp);
        ipp.drcp_enabled = false;
        pm.recheck(&ipp);
        assert_eq!(pm.state, DrcpPeriodicState::NoPeriodic);
        assert!(!pm.timer.is_running());
    }
}
