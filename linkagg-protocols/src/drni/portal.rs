//! IPP and relay task harnesses and the portal manager
//!
//! The relay task owns the `DistributedRelay` and the Gateway/Aggregator
//! machines; each IPP task owns its `Ipp` record and the per-IPP DRCP
//! machines. They communicate only by typed messages: neighbour updates
//! flow up to the relay, recomputed conversation vectors flow back down.

use super::aggmachine::{AggregatorMachine, AmState};
use super::gateway::{GatewayMachine, GmState};
use super::ipp::{Ipp, IppCounters, IppStatic};
use super::periodic::{DrcpPeriodicMachine, DrcpPeriodicState};
use super::relay::{DistributedRelay, NeighborRecord};
use super::rxm::DrcpRxMachine;
use super::txm::DrcpTxMachine;
use super::DrniAction;
use linkagg_core::{
    Error, FrameTransport, IppId, PortId, PortalConfig, PortalSystemNumber, Result,
};
use linkagg_packet::{
    drcpdu::DRCP_VERSION, ConversationVector, EtherType, EthernetFrame, Drcpdu, DRCP_SUBTYPE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events accepted by an IPP task
#[derive(Debug)]
pub enum IppEvent {
    SetEnabled(bool),
    SetDrcpEnabled(bool),
    /// A raw Ethernet frame received on this IPP
    Frame(Vec<u8>),
    /// Relay → IPP: the home gateway capability vector to advertise
    GatewayVector(ConversationVector),
    /// Relay → IPP: the recomputed port responsibility vector to advertise
    PortVector(ConversationVector),
    /// Relay → IPP: the local active aggregation ports changed
    HomePorts(Vec<u32>),
    Query(oneshot::Sender<IppSnapshot>),
    Kill,
}

/// Events accepted by the relay task
#[derive(Debug)]
pub enum RelayEvent {
    NeighborUpdated {
        ipp: IppId,
        record: NeighborRecord,
        gateway_update: bool,
        port_update: bool,
    },
    NeighborExpired {
        ipp: IppId,
    },
    SetHomeGatewayVector(ConversationVector),
    SetHomeActivePorts(Vec<u32>),
    IppGatewayDone(IppId),
    IppPortDone(IppId),
    Query(oneshot::Sender<RelaySnapshot>),
    Kill,
}

/// Consistent view of one IPP's state
#[derive(Debug, Clone)]
pub struct IppSnapshot {
    pub enabled: bool,
    pub drcp_enabled: bool,
    pub ntt: bool,
    pub periodic_state: DrcpPeriodicState,
    pub neighbor_present: bool,
    pub counters: IppCounters,
}

/// Consistent view of the relay's conversation state
#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    pub gm_state: GmState,
    pub am_state: AmState,
    pub gateway_conversation: Vec<Option<PortalSystemNumber>>,
    pub port_conversation: Vec<Option<PortalSystemNumber>>,
    pub ps_gateway_conversation: ConversationVector,
    pub ps_port_conversation: ConversationVector,
    pub neighbor_count: usize,
}

enum IppFired {
    Inbox(Option<IppEvent>),
    CurrentWhile,
    Periodic,
}

struct IppTask {
    ipp: Ipp,
    stat: IppStatic,
    rxm: DrcpRxMachine,
    periodic: DrcpPeriodicMachine,
    txm: DrcpTxMachine,
    transport: Arc<dyn FrameTransport>,
    inbox: mpsc::Receiver<IppEvent>,
    relay_tx: mpsc::Sender<RelayEvent>,
}

impl IppTask {
    async fn run(mut self) {
        info!(ipp = %self.ipp.id, "ipp task started");
        loop {
            let fired = tokio::select! {
                ev = self.inbox.recv() => IppFired::Inbox(ev),
                _ = self.rxm.current_while.wait() => IppFired::CurrentWhile,
                _ = self.periodic.timer.wait() => IppFired::Periodic,
            };
            match fired {
                IppFired::Inbox(None) | IppFired::Inbox(Some(IppEvent::Kill)) => break,
                IppFired::Inbox(Some(ev)) => self.handle(ev).await,
                IppFired::CurrentWhile => {
                    let actions = self.rxm.on_expiry(&mut self.ipp);
                    self.apply(actions).await;
                }
                IppFired::Periodic => {
                    let actions = self.periodic.on_timer(&self.ipp);
                    self.apply(actions).await;
                }
            }
        }
        self.rxm.current_while.stop();
        self.periodic.timer.stop();
        self.inbox.close();
        while self.inbox.try_recv().is_ok() {}
        info!(ipp = %self.ipp.id, "ipp task stopped");
    }

    async fn handle(&mut self, event: IppEvent) {
        match event {
            IppEvent::SetEnabled(enabled) => {
                self.ipp.enabled = enabled;
                if enabled {
                    // introduce ourselves to the neighbour right away
                    self.apply(vec![DrniAction::Ntt]).await;
                } else {
                    let actions = self.rxm.on_expiry(&mut self.ipp);
                    self.apply(actions).await;
                }
                self.periodic.recheck(&self.ipp);
            }
            IppEvent::SetDrcpEnabled(enabled) => {
                self.ipp.drcp_enabled = enabled;
                self.periodic.recheck(&self.ipp);
            }
            IppEvent::Frame(bytes) => self.on_frame(&bytes).await,
            IppEvent::GatewayVector(vector) => {
                self.ipp.gateway_vector_tx = vector;
                self.ipp.gateway_conversation_transmit = true;
                self.apply(vec![DrniAction::Ntt]).await;
                let _ = self
                    .relay_tx
                    .send(RelayEvent::IppGatewayDone(self.ipp.id))
                    .await;
            }
            IppEvent::PortVector(vector) => {
                self.ipp.port_vector_tx = vector;
                self.ipp.port_conversation_transmit = true;
                self.apply(vec![DrniAction::Ntt]).await;
                let _ = self
                    .relay_tx
                    .send(RelayEvent::IppPortDone(self.ipp.id))
                    .await;
            }
            IppEvent::HomePorts(ports) => {
                self.ipp.home_active_ports = ports;
                self.apply(vec![DrniAction::Ntt]).await;
            }
            IppEvent::Query(reply) => {
                let _ = reply.send(self.snapshot());
            }
            IppEvent::Kill => unreachable!("handled by the run loop"),
        }
    }

    async fn on_frame(&mut self, bytes: &[u8]) {
        let frame = match EthernetFrame::parse(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                self.ipp.counters.rx_bad_pdu += 1;
                debug!(ipp = %self.ipp.id, %err, "dropping unparseable frame");
                return;
            }
        };
        if frame.ethertype != EtherType::SlowProtocols
            || frame.payload.first() != Some(&DRCP_SUBTYPE)
        {
            return;
        }
        match Drcpdu::parse(&frame.payload) {
            Ok(pdu) => {
                self.ipp.counters.drcpdus_rx += 1;
                if pdu.version != DRCP_VERSION {
                    warn!(
                        ipp = %self.ipp.id,
                        version = pdu.version,
                        "neighbour speaks a different DRCP version, processing known TLVs"
                    );
                }
                let actions = self.rxm.on_pdu(&mut self.ipp, &self.stat, &pdu);
                self.apply(actions).await;
            }
            Err(err) => {
                self.ipp.counters.rx_bad_pdu += 1;
                debug!(ipp = %self.ipp.id, %err, "dropping malformed DRCPDU");
            }
        }
    }

    async fn apply(&mut self, actions: Vec<DrniAction>) {
        if actions.contains(&DrniAction::NeighborChanged) {
            if let Some(record) = self.ipp.neighbor.clone() {
                let _ = self
                    .relay_tx
                    .send(RelayEvent::NeighborUpdated {
                        ipp: self.ipp.id,
                        record,
                        gateway_update: actions.contains(&DrniAction::GatewayUpdate),
                        port_update: actions.contains(&DrniAction::PortUpdate),
                    })
                    .await;
            }
        }
        if actions.contains(&DrniAction::NeighborGone) {
            let _ = self
                .relay_tx
                .send(RelayEvent::NeighborExpired { ipp: self.ipp.id })
                .await;
        }
        if actions.contains(&DrniAction::Ntt) {
            self.ipp.ntt = true;
            self.flush_tx().await;
        }
        self.periodic.recheck(&self.ipp);
    }

    async fn flush_tx(&mut self) {
        let mtu = self.transport.mtu(self.stat.transport_port);
        let pdus = self.txm.on_ntt(&mut self.ipp, &self.stat, mtu);
        for pdu in pdus {
            let frame = EthernetFrame::slow_protocols(self.stat.portal_addr, pdu.build());
            match self
                .transport
                .send(self.stat.transport_port, &frame.build())
                .await
            {
                Ok(()) => self.ipp.counters.drcpdus_tx += 1,
                Err(err) => {
                    warn!(ipp = %self.ipp.id, %err, "transport loss, disabling IPP");
                    self.ipp.enabled = false;
                    let actions = self.rxm.on_expiry(&mut self.ipp);
                    // the neighbour state is gone; the relay hears about it
                    if actions.contains(&DrniAction::NeighborGone) {
                        let _ = self
                            .relay_tx
                            .send(RelayEvent::NeighborExpired { ipp: self.ipp.id })
                            .await;
                    }
                    self.periodic.recheck(&self.ipp);
                    return;
                }
            }
        }
    }

    fn snapshot(&self) -> IppSnapshot {
        IppSnapshot {
            enabled: self.ipp.enabled,
            drcp_enabled: self.ipp.drcp_enabled,
            ntt: self.ipp.ntt,
            periodic_state: self.periodic.state,
            neighbor_present: self.ipp.neighbor.is_some(),
            counters: self.ipp.counters,
        }
    }
}

struct RelayTask {
    relay: DistributedRelay,
    gm: GatewayMachine,
    am: AggregatorMachine,
    inbox: mpsc::Receiver<RelayEvent>,
    ipp_txs: HashMap<IppId, mpsc::Sender<IppEvent>>,
}

impl RelayTask {
    async fn run(mut self) {
        info!(system = %self.relay.home_system_number(), "relay task started");
        self.gm.begin(&mut self.relay);
        self.am.begin(&mut self.relay);
        while let Some(event) = self.inbox.recv().await {
            match event {
                RelayEvent::NeighborUpdated {
                    ipp,
                    record,
                    gateway_update,
                    port_update,
                } => {
                    self.relay.neighbors.insert(ipp, record);
                    self.relay.gateway_conversation_update |= gateway_update;
                    self.relay.port_conversation_update |= port_update;
                    self.run_machines().await;
                }
                RelayEvent::NeighborExpired { ipp } => {
                    self.relay.clear_neighbor(ipp);
                    self.run_machines().await;
                }
                RelayEvent::SetHomeGatewayVector(vector) => {
                    self.relay.home_gateway_vector = vector;
                    self.relay.gateway_conversation_update = true;
                    self.run_machines().await;
                }
                RelayEvent::SetHomeActivePorts(ports) => {
                    self.relay.home_active_ports = ports.clone();
                    self.relay.port_conversation_update = true;
                    for tx in self.ipp_txs.values() {
                        let _ = tx.send(IppEvent::HomePorts(ports.clone())).await;
                    }
                    self.run_machines().await;
                }
                RelayEvent::IppGatewayDone(ipp) => {
                    self.relay.ipp_gateway_update.insert(ipp, false);
                    self.run_machines().await;
                }
                RelayEvent::IppPortDone(ipp) => {
                    self.relay.ipp_port_update.insert(ipp, false);
                    self.run_machines().await;
                }
                RelayEvent::Query(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                RelayEvent::Kill => break,
            }
        }
        info!(system = %self.relay.home_system_number(), "relay task stopped");
    }

    /// Run the Gateway and Aggregator machines, then push their results to
    /// the IPPs that owe a recomputation, and the refreshed per-system
    /// vectors once every IPP has reported back
    async fn run_machines(&mut self) {
        let am_before = self.am.state;
        self.gm.run(&mut self.relay);
        self.am.run(&mut self.relay);

        // the gateway TLV carries the home capability map so neighbours can
        // judge our eligibility; the port TLV carries our responsibility map
        let mut sends: Vec<(IppId, IppEvent)> = Vec::new();
        for (id, flag) in &self.relay.ipp_gateway_update {
            if *flag {
                sends.push((
                    *id,
                    IppEvent::GatewayVector(self.relay.home_gateway_vector.clone()),
                ));
            }
        }
        for (id, flag) in &self.relay.ipp_port_update {
            if *flag {
                sends.push((
                    *id,
                    IppEvent::PortVector(self.relay.ps_port_conversation.clone()),
                ));
            }
        }
        if am_before != AmState::PsPortUpdate && self.am.state == AmState::PsPortUpdate {
            // the responsibility map only settles in the PS pass
            for id in self.ipp_txs.keys() {
                sends.push((
                    *id,
                    IppEvent::PortVector(self.relay.ps_port_conversation.clone()),
                ));
            }
        }
        for (id, event) in sends {
            if let Some(tx) = self.ipp_txs.get(&id) {
                let _ = tx.send(event).await;
            }
        }
    }

    fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            gm_state: self.gm.state,
            am_state: self.am.state,
            gateway_conversation: self.relay.gateway_conversation.clone(),
            port_conversation: self.relay.port_conversation.clone(),
            ps_gateway_conversation: self.relay.ps_gateway_conversation.clone(),
            ps_port_conversation: self.relay.ps_port_conversation.clone(),
            neighbor_count: self.relay.neighbors.len(),
        }
    }
}

/// Manager of one portal's relay and IPP tasks
pub struct Portal {
    relay_tx: mpsc::Sender<RelayEvent>,
    ipp_txs: HashMap<IppId, mpsc::Sender<IppEvent>>,
    joins: Vec<JoinHandle<()>>,
}

impl Portal {
    /// Validate the configuration, then spawn the relay task and one task
    /// per configured IPP. IPP ids double as transport port ids.
    pub fn spawn(cfg: PortalConfig, transport: Arc<dyn FrameTransport>) -> Result<Self> {
        cfg.validate()?;
        let relay = DistributedRelay::new(cfg.clone());
        let base_stat = IppStatic::from_config(&cfg, relay.gateway_digest, relay.port_digest);

        let (relay_tx, relay_rx) = mpsc::channel(64);
        let mut ipp_txs = HashMap::new();
        let mut joins = Vec::new();

        for ipp_cfg in &cfg.ipp_list {
            let (tx, rx) = mpsc::channel(64);
            let mut stat = base_stat.clone();
            stat.transport_port = PortId(
                u16::try_from(ipp_cfg.id.0)
                    .map_err(|_| Error::invalid_parameter("ipp id", "exceeds port id range"))?,
            );
            let task = IppTask {
                ipp: Ipp::new(ipp_cfg.id, ipp_cfg.neighbor_system_number),
                stat,
                rxm: DrcpRxMachine::new(),
                periodic: DrcpPeriodicMachine::new(),
                txm: DrcpTxMachine::new(),
                transport: Arc::clone(&transport),
                inbox: rx,
                relay_tx: relay_tx.clone(),
            };
            joins.push(tokio::spawn(task.run()));
            ipp_txs.insert(ipp_cfg.id, tx);
        }

        let relay_task = RelayTask {
            relay,
            gm: GatewayMachine::new(),
            am: AggregatorMachine::new(),
            inbox: relay_rx,
            ipp_txs: ipp_txs.clone(),
        };
        joins.push(tokio::spawn(relay_task.run()));

        Ok(Self {
            relay_tx,
            ipp_txs,
            joins,
        })
    }

    fn ipp_sender(&self, ipp: IppId) -> Result<&mpsc::Sender<IppEvent>> {
        self.ipp_txs
            .get(&ipp)
            .ok_or_else(|| Error::NotFound(ipp.to_string()))
    }

    /// Clone of one IPP's inbox, for embedders pumping received frames
    pub fn sender(&self, ipp: IppId) -> Result<mpsc::Sender<IppEvent>> {
        self.ipp_sender(ipp).cloned()
    }

    pub async fn set_ipp_enabled(&self, ipp: IppId, enabled: bool) -> Result<()> {
        self.ipp_sender(ipp)?
            .send(IppEvent::SetEnabled(enabled))
            .await
            .map_err(|_| Error::ChannelClosed(ipp.to_string()))
    }

    /// Inject a received frame into the owning IPP task
    pub async fn inject_frame(&self, ipp: IppId, bytes: Vec<u8>) -> Result<()> {
        self.ipp_sender(ipp)?
            .send(IppEvent::Frame(bytes))
            .await
            .map_err(|_| Error::ChannelClosed(ipp.to_string()))
    }

    /// Operator update of the local gateway capability vector
    pub async fn set_home_gateway_vector(&self, vector: ConversationVector) -> Result<()> {
        self.relay_tx
            .send(RelayEvent::SetHomeGatewayVector(vector))
            .await
            .map_err(|_| Error::ChannelClosed("relay".into()))
    }

    /// Update of the locally distributing aggregation ports
    pub async fn set_home_active_ports(&self, ports: Vec<u32>) -> Result<()> {
        self.relay_tx
            .send(RelayEvent::SetHomeActivePorts(ports))
            .await
            .map_err(|_| Error::ChannelClosed("relay".into()))
    }

    pub async fn ipp_snapshot(&self, ipp: IppId) -> Result<IppSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.ipp_sender(ipp)?
            .send(IppEvent::Query(reply))
            .await
            .map_err(|_| Error::ChannelClosed(ipp.to_string()))?;
        rx.await.map_err(|_| Error::ChannelClosed(ipp.to_string()))
    }

    pub async fn relay_snapshot(&self) -> Result<RelaySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.relay_tx
            .send(RelayEvent::Query(reply))
            .await
            .map_err(|_| Error::ChannelClosed("relay".into()))?;
        rx.await.map_err(|_| Error::ChannelClosed("relay".into()))
    }

    /// Stop every task, cancelling timers on the way out
    pub async fn shutdown(mut self) {
        for tx in self.ipp_txs.values() {
            let _ = tx.send(IppEvent::Kill).await;
        }
        let _ = self.relay_tx.send(RelayEvent::Kill).await;
        for join in self.joins.drain(..) {
            let _ = join.await;
        }
    }
}
