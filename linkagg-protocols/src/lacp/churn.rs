//! Actor and Partner Churn detection (802.1AX-2014 clause 6.4.17)
//!
//! A churn monitor watches one Sync bit. When the Mux path is up but Sync
//! has not stabilized within the detection window, the machine declares
//! churn, which surfaces as a diagnostic for the operator. Stabilized Sync
//! returns it to quiet.

use super::constants::CHURN_DETECTION_TIME;
use super::port::AggPort;
use linkagg_core::Deadline;
use std::fmt;
use tracing::warn;

/// Which endpoint's Sync bit this monitor watches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnKind {
    Actor,
    Partner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChurnState {
    NoChurn,
    Monitor,
    Churn,
}

impl fmt::Display for ChurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChurnState::NoChurn => "NoChurn",
            ChurnState::Monitor => "Monitor",
            ChurnState::Churn => "Churn",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct ChurnMachine {
    pub kind: ChurnKind,
    pub state: ChurnState,
    pub timer: Deadline,
}

impl ChurnMachine {
    pub fn new(kind: ChurnKind) -> Self {
        Self {
            kind,
            state: ChurnState::NoChurn,
            timer: Deadline::new(),
        }
    }

    pub fn begin(&mut self) {
        self.state = ChurnState::NoChurn;
        self.timer.stop();
    }

    fn sync_ok(&self, port: &AggPort) -> bool {
        match self.kind {
            ChurnKind::Actor => port.actor_oper.state.sync(),
            ChurnKind::Partner => port.partner_oper.state.sync(),
        }
    }

    /// Re-evaluate after any event that may have changed Sync or taken the
    /// port down
    pub fn recheck(&mut self, port: &AggPort) {
        if !port.port_enabled || !port.lacp_enabled {
            self.begin();
            return;
        }
        if self.sync_ok(port) {
            if self.state != ChurnState::NoChurn {
                self.state = ChurnState::NoChurn;
                self.timer.stop();
            }
        } else if self.state == ChurnState::NoChurn {
            self.state = ChurnState::Monitor;
            self.timer.start(CHURN_DETECTION_TIME);
        }
    }

    /// The detection window elapsed without Sync stabilizing
    pub fn on_timer(&mut self, port: &mut AggPort) {
        self.timer.stop();
        if self.state == ChurnState::Monitor {
            self.state = ChurnState::Churn;
            port.counters.churn_events += 1;
            warn!(port = %port.id, kind = ?self.kind, "churn detected: sync failed to stabilize");
        }
    }
}
