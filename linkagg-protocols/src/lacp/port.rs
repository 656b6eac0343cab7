//! The per-port operational record
//!
//! One `AggPort` exists per enrolled aggregation port. It is owned by the
//! port's task and mutated only by that task's machines.

use linkagg_core::{AggregatorId, LacpMode, PortConfig, PortId};
use linkagg_packet::{LacpState, PduPortInfo};

/// Aggregator selection status of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selected {
    #[default]
    Unselected,
    Selected,
    Standby,
}

/// Per-port diagnostic counters
#[derive(Debug, Clone, Copy, Default)]
pub struct PortCounters {
    pub lacpdus_rx: u64,
    pub lacpdus_tx: u64,
    pub rx_bad_pdu: u64,
    pub churn_events: u64,
}

/// Operational record of one aggregation port
#[derive(Debug, Clone)]
pub struct AggPort {
    pub id: PortId,
    pub mode: LacpMode,

    pub actor_admin: PduPortInfo,
    pub actor_oper: PduPortInfo,
    pub partner_admin: PduPortInfo,
    pub partner_oper: PduPortInfo,

    pub lacp_enabled: bool,
    pub port_enabled: bool,
    pub port_moved: bool,

    pub selected: Selected,
    /// Aggregator chosen by Selection; the Mux machine attaches to it
    pub assigned_agg: Option<AggregatorId>,
    /// Aggregator the port is attached to (None = detached)
    pub agg_id: Option<AggregatorId>,

    /// LACP version last seen from the partner
    pub partner_version: u8,

    pub counters: PortCounters,
}

impl AggPort {
    pub fn new(cfg: &PortConfig, short_timeout: bool) -> Self {
        let mut actor_state = LacpState(LacpState::AGGREGATION);
        if cfg.mode == LacpMode::Active {
            actor_state.set(LacpState::ACTIVITY);
        }
        if short_timeout {
            actor_state.set(LacpState::TIMEOUT);
        }
        let actor_admin = PduPortInfo {
            system: cfg.actor_system(),
            key: cfg.actor_key,
            port_priority: cfg.actor_port_priority,
            port: cfg.port,
            state: actor_state,
        };
        let partner_admin = PduPortInfo {
            system: cfg.partner_admin.system,
            key: cfg.partner_admin.key,
            port_priority: cfg.partner_admin.port_priority,
            port: PortId(cfg.partner_admin.port),
            state: LacpState(LacpState::AGGREGATION),
        };

        Self {
            id: cfg.port,
            mode: cfg.mode,
            actor_admin,
            actor_oper: actor_admin,
            partner_admin,
            partner_oper: partner_admin,
            lacp_enabled: cfg.mode != LacpMode::On,
            port_enabled: false,
            port_moved: false,
            selected: Selected::Unselected,
            assigned_agg: None,
            agg_id: None,
            partner_version: 0,
            counters: PortCounters::default(),
        }
    }

    /// Reset operational parameters to administrative values
    pub fn reset_oper(&mut self) {
        self.actor_oper = self.actor_admin;
        self.partner_oper = self.partner_admin;
        self.partner_version = 0;
    }

    /// Change the actor's advertised timeout preference
    pub fn set_actor_short_timeout(&mut self, short: bool) {
        self.actor_admin.state.assign(LacpState::TIMEOUT, short);
        self.actor_oper.state.assign(LacpState::TIMEOUT, short);
    }
}

/// Fixture shared by the machine unit tests
#[cfg(test)]
pub(crate) fn test_config(port: u16, mode: LacpMode) -> PortConfig {
    use linkagg_core::{MacAddr, PartnerAdminConfig};
    PortConfig {
        port: PortId(port),
        mode,
        actor_system_priority: 0x8000,
        actor_system_mac: MacAddr([0xAA, 0, 0, 0, 0, 0x01]),
        actor_key: 10,
        actor_port_priority: 0x8000,
        partner_admin: PartnerAdminConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_port_active_short() {
        let port = AggPort::new(&test_config(1, LacpMode::Active), true);
        assert!(port.actor_oper.state.activity());
        assert!(port.actor_oper.state.short_timeout());
        assert!(port.actor_oper.state.aggregation());
        assert!(port.lacp_enabled);
        assert!(!port.port_enabled);
        assert_eq!(port.selected, Selected::Unselected);
    }

    #[test]
    fn test_new_port_passive() {
        let port = AggPort::new(&test_config(1, LacpMode::Passive), true);
        assert!(!port.actor_oper.state.activity());
        assert!(port.lacp_enabled);
    }

    #[test]
    fn test_new_port_static_on() {
        let port = AggPort::new(&test_config(1, LacpMode::On), true);
        assert!(!port.lacp_enabled);
    }

    #[test]
    fn test_reset_oper_restores_admin() {
        let mut port = AggPort::new(&test_config(1, LacpMode::Active), true);
        port.partner_oper.key = 99;
        port.actor_oper.state.set(LacpState::EXPIRED);
        port.reset_oper();
        assert_eq!(port.partner_oper.key, 0);
        assert!(!port.actor_oper.state.expired());
    }
}
