//! Aggregator selection logic (802.1AX-2014 clause 6.4.14.1)
//!
//! Groups ports by the composite key (actor key, partner system, partner
//! key) and binds each group to the lowest-numbered matching or free
//! aggregator. The table is the single writer of selection results; port
//! tasks call in with their own port record, and ties between ports resolve
//! deterministically because the LAG walks ports in ascending port order.

use super::port::{AggPort, Selected};
use linkagg_core::{AggregatorId, PortId, SystemId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// The composite key one aggregator serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionKey {
    pub actor_key: u16,
    pub partner_system: SystemId,
    pub partner_key: u16,
}

impl SelectionKey {
    pub fn of(port: &AggPort) -> Self {
        Self {
            actor_key: port.actor_oper.key,
            partner_system: port.partner_oper.system,
            partner_key: port.partner_oper.key,
        }
    }
}

/// One link aggregation group
#[derive(Debug, Clone)]
pub struct Aggregator {
    pub id: AggregatorId,
    pub key: Option<SelectionKey>,
    /// Attached ports in ascending port order
    pub attached: Vec<PortId>,
}

/// Shared selection and readiness state for one LAG manager
#[derive(Debug)]
pub struct SelectionTable {
    aggs: Vec<Aggregator>,
    assignment: BTreeMap<PortId, AggregatorId>,
    waiting: BTreeSet<PortId>,
    wait_done: BTreeSet<PortId>,
}

impl SelectionTable {
    pub fn new(ids: impl IntoIterator<Item = AggregatorId>) -> Self {
        let mut aggs: Vec<Aggregator> = ids
            .into_iter()
            .map(|id| Aggregator {
                id,
                key: None,
                attached: Vec::new(),
            })
            .collect();
        aggs.sort_by_key(|a| a.id);
        Self {
            aggs,
            assignment: BTreeMap::new(),
            waiting: BTreeSet::new(),
            wait_done: BTreeSet::new(),
        }
    }

    pub fn aggregator(&self, id: AggregatorId) -> Option<&Aggregator> {
        self.aggs.iter().find(|a| a.id == id)
    }

    fn aggregator_mut(&mut self, id: AggregatorId) -> Option<&mut Aggregator> {
        self.aggs.iter_mut().find(|a| a.id == id)
    }

    /// Run selection for one port, writing `selected` and `assigned_agg`
    pub fn select(&mut self, port: &mut AggPort) {
        if !port.lacp_enabled || !port.port_enabled {
            self.deselect(port);
            return;
        }
        let key = SelectionKey::of(port);

        if let Some(current) = self.assignment.get(&port.id).copied() {
            if self.aggregator(current).and_then(|a| a.key) == Some(key) {
                port.selected = Selected::Selected;
                port.assigned_agg = Some(current);
                return;
            }
            self.deselect(port);
        }

        // lowest matching aggregator first, lowest free one second
        let chosen = self
            .aggs
            .iter()
            .find(|a| a.key == Some(key))
            .or_else(|| self.aggs.iter().find(|a| a.key.is_none()))
            .map(|a| a.id);

        match chosen {
            Some(id) => {
                self.assignment.insert(port.id, id);
                if let Some(agg) = self.aggregator_mut(id) {
                    agg.key = Some(key);
                }
                port.selected = Selected::Selected;
                port.assigned_agg = Some(id);
                debug!(port = %port.id, agg = %id, "selected");
            }
            None => {
                port.selected = Selected::Standby;
                port.assigned_agg = None;
                debug!(port = %port.id, "standby: no free aggregator");
            }
        }
    }

    /// Release a port's assignment; frees the aggregator's key when the
    /// last member leaves
    pub fn deselect(&mut self, port: &mut AggPort) {
        self.waiting.remove(&port.id);
        self.wait_done.remove(&port.id);
        if let Some(agg_id) = self.assignment.remove(&port.id) {
            let empty = !self.assignment.values().any(|a| *a == agg_id);
            if let Some(agg) = self.aggregator_mut(agg_id) {
                agg.attached.retain(|p| *p != port.id);
                if empty {
                    agg.key = None;
                }
            }
        }
        port.selected = Selected::Unselected;
        port.assigned_agg = None;
    }

    /// Port entered Mux Waiting
    pub fn enter_waiting(&mut self, port: PortId) {
        self.waiting.insert(port);
        self.wait_done.remove(&port);
    }

    /// Port's wait-while elapsed. Returns true when every waiting member of
    /// its selection group has also elapsed.
    pub fn wait_elapsed(&mut self, port: PortId) -> bool {
        self.wait_done.insert(port);
        self.group_ready(port)
    }

    /// Readiness of the group containing `port`
    pub fn group_ready(&self, port: PortId) -> bool {
        let Some(agg_id) = self.assignment.get(&port).copied() else {
            return false;
        };
        self.assignment
            .iter()
            .filter(|(_, a)| **a == agg_id)
            .all(|(p, _)| !self.waiting.contains(p) || self.wait_done.contains(p))
    }

    /// Sibling ports assigned to the same aggregator
    pub fn group_peers(&self, port: PortId) -> Vec<PortId> {
        let Some(agg_id) = self.assignment.get(&port).copied() else {
            return Vec::new();
        };
        self.assignment
            .iter()
            .filter(|(p, a)| **a == agg_id && **p != port)
            .map(|(p, _)| *p)
            .collect()
    }

    /// Record an attach performed by the Mux machine
    pub fn attach(&mut self, port: PortId, agg_id: AggregatorId) {
        self.waiting.remove(&port);
        if let Some(agg) = self.aggregator_mut(agg_id) {
            if !agg.attached.contains(&port) {
                agg.attached.push(port);
                agg.attached.sort();
            }
        }
    }

    /// Record a detach performed by the Mux machine
    pub fn detach(&mut self, port: PortId, agg_id: AggregatorId) {
        if let Some(agg) = self.aggregator_mut(agg_id) {
            agg.attached.retain(|p| *p != port);
        }
    }
}
