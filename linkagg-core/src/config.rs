//! Administrative configuration for ports and portals
//!
//! Configuration is supplied by the embedder as deserialized structures and
//! validated once at admission. Runtime state is never mutated from a
//! configuration object that failed validation.

use crate::{Error, IppId, MacAddr, PortId, PortalSystemNumber, Result, SystemId, MAX_CONVERSATIONS};
use serde::Deserialize;

/// LACP activity mode of an aggregation port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LacpMode {
    /// Static aggregation, no LACPDU exchange
    On,
    /// Speak LACP unconditionally
    Active,
    /// Speak LACP only when the partner does
    Passive,
}

/// Administrative partner parameters, used while no partner information has
/// been received (the Defaulted path)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PartnerAdminConfig {
    pub system: SystemId,
    pub key: u16,
    #[serde(default)]
    pub port_priority: u16,
    #[serde(default)]
    pub port: u16,
}

impl Default for PartnerAdminConfig {
    fn default() -> Self {
        Self {
            system: SystemId::default(),
            key: 0,
            port_priority: 0,
            port: 0,
        }
    }
}

/// Per-port administrative configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub port: PortId,
    pub mode: LacpMode,
    pub actor_system_priority: u16,
    pub actor_system_mac: MacAddr,
    pub actor_key: u16,
    #[serde(default = "default_port_priority")]
    pub actor_port_priority: u16,
    #[serde(default)]
    pub partner_admin: PartnerAdminConfig,
}

fn default_port_priority() -> u16 {
    0x8000
}

impl PortConfig {
    pub fn actor_system(&self) -> SystemId {
        SystemId::new(self.actor_system_priority, self.actor_system_mac)
    }

    pub fn validate(&self) -> Result<()> {
        if self.actor_system_mac.is_zero() {
            return Err(Error::config(format!(
                "{}: actor system MAC must not be zero",
                self.port
            )));
        }
        Ok(())
    }
}

/// One intra-portal link in a portal configuration
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct IppConfig {
    pub id: IppId,
    /// Portal System Number of the system on the far end of this link
    pub neighbor_system_number: PortalSystemNumber,
}

/// Per-conversation-ID admin preference list: portal system numbers in
/// descending priority order
pub type ConvAdminTable = Vec<Vec<PortalSystemNumber>>;

/// Distributed Relay (portal) administrative configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub portal_priority: u16,
    pub portal_addr: MacAddr,
    pub portal_system_number: PortalSystemNumber,
    pub aggregator_priority: u16,
    pub aggregator_id: MacAddr,
    pub ipp_list: Vec<IppConfig>,
    pub conv_admin_gateway: ConvAdminTable,
    pub conv_admin_port: ConvAdminTable,
    pub port_algorithm: u32,
    pub gateway_algorithm: u32,
    #[serde(default)]
    pub common_methods: bool,
    #[serde(default)]
    pub three_system_portal: bool,
}

impl PortalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.portal_addr.is_zero() {
            return Err(Error::config("portal address must not be zero"));
        }
        if self.ipp_list.is_empty() {
            return Err(Error::config("portal requires at least one IPP"));
        }
        let mut seen_ipps: Vec<IppId> = Vec::new();
        for ipp in &self.ipp_list {
            if ipp.neighbor_system_number == self.portal_system_number {
                return Err(Error::config(format!(
                    "{}: neighbor system number equals our own {}",
                    ipp.id, self.portal_system_number
                )));
            }
            if seen_ipps.contains(&ipp.id) {
                return Err(Error::config(format!("duplicate IPP id {}", ipp.id)));
            }
            seen_ipps.push(ipp.id);
        }
        if !self.three_system_portal && self.ipp_list.len() > 1 {
            return Err(Error::config(
                "two-system portal admits exactly one IPP",
            ));
        }
        validate_conv_admin("conv_admin_gateway", &self.conv_admin_gateway, self)?;
        validate_conv_admin("conv_admin_port", &self.conv_admin_port, self)?;
        Ok(())
    }
}

fn validate_conv_admin(name: &str, table: &ConvAdminTable, cfg: &PortalConfig) -> Result<()> {
    if table.len() != MAX_CONVERSATIONS {
        return Err(Error::config(format!(
            "{name} holds {} entries, expected {MAX_CONVERSATIONS}",
            table.len()
        )));
    }
    for (id, prefs) in table.iter().enumerate() {
        for psn in prefs {
            if !cfg.three_system_portal && psn.get() == 3 {
                return Err(Error::config(format!(
                    "{name}[{id}] references system 3 in a two-system portal"
                )));
            }
        }
    }
    Ok(())
}

/// Admission check across all portals configured on one system: no two
/// portals of the same portal address may claim the same Portal System Number.
pub fn validate_portal_set(portals: &[PortalConfig]) -> Result<()> {
    for portal in portals {
        portal.validate()?;
    }
    for (i, a) in portals.iter().enumerate() {
        for b in portals.iter().skip(i + 1) {
            if a.portal_addr == b.portal_addr
                && a.portal_system_number == b.portal_system_number
            {
                return Err(Error::config(format!(
                    "portal {} claims {} twice",
                    a.portal_addr, a.portal_system_number
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn portal(psn: u8, ipps: Vec<IppConfig>) -> PortalConfig {
        PortalConfig {
            portal_priority: 0x8000,
            portal_addr: MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            portal_system_number: PortalSystemNumber::new(psn).unwrap(),
            aggregator_priority: 0x8000,
            aggregator_id: MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x66]),
            ipp_list: ipps,
            conv_admin_gateway: vec![Vec::new(); MAX_CONVERSATIONS],
            conv_admin_port: vec![Vec::new(); MAX_CONVERSATIONS],
            port_algorithm: 0,
            gateway_algorithm: 0,
            common_methods: false,
            three_system_portal: false,
        }
    }

    fn ipp(id: u32, neighbor: u8) -> IppConfig {
        IppConfig {
            id: IppId(id),
            neighbor_system_number: PortalSystemNumber::new(neighbor).unwrap(),
        }
    }

    #[test]
    fn test_portal_accepts_two_system_shape() {
        assert!(portal(1, vec![ipp(1, 2)]).validate().is_ok());
    }

    #[test]
    fn test_portal_rejects_self_neighbor() {
        let err = portal(1, vec![ipp(1, 1)]).validate().unwrap_err();
        assert!(matches!(err, Error::ConfigConflict(_)));
    }

    #[test]
    fn test_portal_rejects_missing_ipp() {
        assert!(portal(1, Vec::new()).validate().is_err());
    }

    #[test]
    fn test_portal_rejects_short_conv_admin() {
        let mut cfg = portal(1, vec![ipp(1, 2)]);
        cfg.conv_admin_gateway.truncate(100);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_portal_rejects_third_system_when_two_system() {
        let mut cfg = portal(1, vec![ipp(1, 2)]);
        cfg.conv_admin_gateway[7] = vec![PortalSystemNumber::new(3).unwrap()];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_portal_set_rejects_duplicate_system_number() {
        let a = portal(1, vec![ipp(1, 2)]);
        let b = portal(1, vec![ipp(2, 2)]);
        assert!(validate_portal_set(&[a, b]).is_err());
    }

    #[test]
    fn test_portal_set_accepts_distinct_system_numbers() {
        let a = portal(1, vec![ipp(1, 2)]);
        let b = portal(2, vec![ipp(2, 1)]);
        assert!(validate_portal_set(&[a, b]).is_ok());
    }
}
