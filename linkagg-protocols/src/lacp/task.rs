//! Per-port task harness and the LAG manager
//!
//! Each enrolled port runs one tokio task that owns the port record and its
//! six machines. The task multiplexes operator events, received frames, and
//! timer fires from a single inbox; every machine step runs to completion
//! before the next suspension point. The [`Lag`] spawns, tracks, and stops
//! these tasks and owns the shared selection table.

use super::churn::{ChurnKind, ChurnMachine, ChurnState};
use super::muxm::{MuxMachine, MuxState};
use super::port::{AggPort, PortCounters, Selected};
use super::ptxm::{PeriodicMachine, PeriodicState};
use super::rxm::{RxEvent, RxMachine, RxState};
use super::selection::SelectionTable;
use super::txm::TxMachine;
use super::Action;
use dashmap::DashMap;
use linkagg_core::{
    AggregatorId, Error, FrameTransport, PortConfig, PortId, Result,
};
use linkagg_packet::{
    EtherType, EthernetFrame, Lacpdu, PduPortInfo, LACP_SUBTYPE, LACP_VERSION,
};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events accepted by a port task
#[derive(Debug)]
pub enum PortEvent {
    Begin,
    SetPortEnabled(bool),
    SetLacpEnabled(bool),
    SetActorShortTimeout(bool),
    PortMoved,
    /// A raw Ethernet frame received on this port
    Frame(Vec<u8>),
    /// A selection-group sibling finished its wait-while
    GroupReady,
    Query(oneshot::Sender<PortSnapshot>),
    Kill,
}

/// Consistent view of a port's state, taken between events
#[derive(Debug, Clone)]
pub struct PortSnapshot {
    pub rx_state: RxState,
    pub periodic_state: PeriodicState,
    pub mux_state: MuxState,
    pub actor_oper: PduPortInfo,
    pub partner_oper: PduPortInfo,
    pub selected: Selected,
    pub agg_id: Option<AggregatorId>,
    pub actor_churn: ChurnState,
    pub partner_churn: ChurnState,
    pub counters: PortCounters,
}

enum Fired {
    Inbox(Option<PortEvent>),
    CurrentWhile,
    Periodic,
    WaitWhile,
    TxWindow,
    ActorChurn,
    PartnerChurn,
}

struct PortTask {
    port: AggPort,
    rxm: RxMachine,
    ptxm: PeriodicMachine,
    txm: TxMachine,
    muxm: MuxMachine,
    churn_actor: ChurnMachine,
    churn_partner: ChurnMachine,
    selection: Arc<RwLock<SelectionTable>>,
    transport: Arc<dyn FrameTransport>,
    inbox: mpsc::Receiver<PortEvent>,
    peers: Arc<DashMap<PortId, mpsc::Sender<PortEvent>>>,
}

impl PortTask {
    async fn run(mut self) {
        info!(port = %self.port.id, "port task started");
        loop {
            let fired = tokio::select! {
                ev = self.inbox.recv() => Fired::Inbox(ev),
                _ = self.rxm.current_while.wait() => Fired::CurrentWhile,
                _ = self.ptxm.timer.wait() => Fired::Periodic,
                _ = self.muxm.wait_while.wait() => Fired::WaitWhile,
                _ = self.txm.window.wait() => Fired::TxWindow,
                _ = self.churn_actor.timer.wait() => Fired::ActorChurn,
                _ = self.churn_partner.timer.wait() => Fired::PartnerChurn,
            };

            match fired {
                Fired::Inbox(None) | Fired::Inbox(Some(PortEvent::Kill)) => break,
                Fired::Inbox(Some(ev)) => self.handle(ev).await,
                Fired::CurrentWhile => {
                    let actions = self.rxm.step(&mut self.port, RxEvent::CurrentWhileExpired);
                    self.after(actions).await;
                }
                Fired::Periodic => {
                    let actions = self.ptxm.on_timer(&self.port);
                    self.after(actions).await;
                }
                Fired::WaitWhile => {
                    self.muxm.wait_elapsed();
                    let (ready, siblings) = {
                        let mut table = self.selection.write();
                        (
                            table.wait_elapsed(self.port.id),
                            table.group_peers(self.port.id),
                        )
                    };
                    let before = self.port.agg_id;
                    let actions = self.muxm.try_attach(&mut self.port, ready);
                    self.sync_attach(before);
                    if ready {
                        for sibling in siblings {
                            if let Some(tx) = self.peers.get(&sibling) {
                                let _ = tx.send(PortEvent::GroupReady).await;
                            }
                        }
                    }
                    self.after(actions).await;
                }
                Fired::TxWindow => {
                    if let Some(pdu) = self.txm.on_window_expired(&self.port) {
                        if !self.transmit(pdu).await {
                            self.demote();
                        }
                    }
                }
                Fired::ActorChurn => self.churn_actor.on_timer(&mut self.port),
                Fired::PartnerChurn => self.churn_partner.on_timer(&mut self.port),
            }
        }
        self.shutdown();
        info!(port = %self.port.id, "port task stopped");
    }

    async fn handle(&mut self, event: PortEvent) {
        match event {
            PortEvent::Begin => {
                let actions = self.rxm.step(&mut self.port, RxEvent::Begin);
                self.ptxm.timer.stop();
                self.ptxm.state = PeriodicState::NoPeriodic;
                self.txm.reset();
                self.muxm.begin(&mut self.port);
                self.churn_actor.begin();
                self.churn_partner.begin();
                self.after(actions).await;
            }
            PortEvent::SetPortEnabled(enabled) => {
                self.port.port_enabled = enabled;
                let actions = self.rxm.step(&mut self.port, RxEvent::PortStateChanged);
                self.after(actions).await;
            }
            PortEvent::SetLacpEnabled(enabled) => {
                self.port.lacp_enabled = enabled;
                let actions = self.rxm.step(&mut self.port, RxEvent::PortStateChanged);
                self.after(actions).await;
            }
            PortEvent::SetActorShortTimeout(short) => {
                self.port.set_actor_short_timeout(short);
                self.after(vec![Action::Ntt]).await;
            }
            PortEvent::PortMoved => {
                let actions = self.rxm.step(&mut self.port, RxEvent::PortMoved);
                self.after(actions).await;
            }
            PortEvent::Frame(bytes) => self.on_frame(&bytes).await,
            PortEvent::GroupReady => {
                let ready = self.selection.read().group_ready(self.port.id);
                let before = self.port.agg_id;
                let actions = self.muxm.try_attach(&mut self.port, ready);
                self.sync_attach(before);
                self.after(actions).await;
            }
            PortEvent::Query(reply) => {
                let _ = reply.send(self.snapshot());
            }
            PortEvent::Kill => unreachable!("handled by the run loop"),
        }
    }

    async fn on_frame(&mut self, bytes: &[u8]) {
        let frame = match EthernetFrame::parse(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                self.port.counters.rx_bad_pdu += 1;
                debug!(port = %self.port.id, %err, "dropping unparseable frame");
                return;
            }
        };
        if frame.ethertype != EtherType::SlowProtocols {
            return;
        }
        if frame.payload.first() != Some(&LACP_SUBTYPE) {
            return;
        }
        match Lacpdu::parse(&frame.payload) {
            Ok(pdu) => {
                self.port.counters.lacpdus_rx += 1;
                if pdu.version != LACP_VERSION {
                    warn!(
                        port = %self.port.id,
                        version = pdu.version,
                        "partner speaks a different LACP version, processing known fields"
                    );
                }
                let actions = self.rxm.step(&mut self.port, RxEvent::Pdu(Box::new(pdu)));
                self.after(actions).await;
            }
            Err(err) => {
                self.port.counters.rx_bad_pdu += 1;
                debug!(port = %self.port.id, %err, "dropping malformed LACPDU");
            }
        }
    }

    /// Post-event pass: run Selection when asked, let the gated machines
    /// re-derive their state, then serve any need-to-transmit
    async fn after(&mut self, mut actions: Vec<Action>) {
        if actions.contains(&Action::RunSelection) {
            let mut table = self.selection.write();
            table.select(&mut self.port);
        }
        if self.port.selected == Selected::Unselected {
            let mut table = self.selection.write();
            table.deselect(&mut self.port);
        }

        let was_waiting = self.muxm.state == MuxState::Waiting;
        let attached_before = self.port.agg_id;
        actions.extend(self.muxm.recheck(&mut self.port));
        {
            let mut table = self.selection.write();
            if !was_waiting && self.muxm.state == MuxState::Waiting {
                table.enter_waiting(self.port.id);
            }
            match (attached_before, self.port.agg_id) {
                (None, Some(agg)) => table.attach(self.port.id, agg),
                (Some(agg), None) => table.detach(self.port.id, agg),
                _ => {}
            }
        }

        self.ptxm.recheck(&self.port);
        actions.extend(self.ptxm.settle(&self.port));
        self.churn_actor.recheck(&self.port);
        self.churn_partner.recheck(&self.port);

        if actions.contains(&Action::Ntt) {
            if let Some(pdu) = self.txm.on_ntt(&self.port) {
                if !self.transmit(pdu).await {
                    self.demote();
                }
            }
        }
    }

    /// Record an attach that just happened in the shared table
    fn sync_attach(&mut self, before: Option<AggregatorId>) {
        if before.is_none() {
            if let Some(agg) = self.port.agg_id {
                self.selection.write().attach(self.port.id, agg);
            }
        }
    }

    /// Transport loss: demote to PortDisabled and let the machines unwind
    fn demote(&mut self) {
        self.port.port_enabled = false;
        let _ = self.rxm.step(&mut self.port, RxEvent::PortStateChanged);
        let _ = self.muxm.recheck(&mut self.port);
        {
            let mut table = self.selection.write();
            table.deselect(&mut self.port);
        }
        self.ptxm.recheck(&self.port);
        self.churn_actor.recheck(&self.port);
        self.churn_partner.recheck(&self.port);
    }

    /// Returns false on transport loss
    async fn transmit(&mut self, pdu: Lacpdu) -> bool {
        let frame =
            EthernetFrame::slow_protocols(self.port.actor_oper.system.mac, pdu.build());
        match self.transport.send(self.port.id, &frame.build()).await {
            Ok(()) => {
                self.port.counters.lacpdus_tx += 1;
                true
            }
            Err(err) => {
                warn!(port = %self.port.id, %err, "transport loss, disabling port");
                false
            }
        }
    }

    fn snapshot(&self) -> PortSnapshot {
        PortSnapshot {
            rx_state: self.rxm.state,
            periodic_state: self.ptxm.state,
            mux_state: self.muxm.state,
            actor_oper: self.port.actor_oper,
            partner_oper: self.port.partner_oper,
            selected: self.port.selected,
            agg_id: self.port.agg_id,
            actor_churn: self.churn_actor.state,
            partner_churn: self.churn_partner.state,
            counters: self.port.counters,
        }
    }

    /// Release timers and drain the inbox before exiting
    fn shutdown(&mut self) {
        self.rxm.current_while.stop();
        self.ptxm.timer.stop();
        self.muxm.wait_while.stop();
        self.txm.reset();
        self.churn_actor.timer.stop();
        self.churn_partner.timer.stop();
        self.inbox.close();
        while self.inbox.try_recv().is_ok() {}
    }
}

/// Manager of one link aggregation group's port tasks
pub struct Lag {
    selection: Arc<RwLock<SelectionTable>>,
    transport: Arc<dyn FrameTransport>,
    senders: Arc<DashMap<PortId, mpsc::Sender<PortEvent>>>,
    tasks: DashMap<PortId, JoinHandle<()>>,
}

impl Lag {
    pub fn new(
        agg_ids: impl IntoIterator<Item = AggregatorId>,
        transport: Arc<dyn FrameTransport>,
    ) -> Self {
        Self {
            selection: Arc::new(RwLock::new(SelectionTable::new(agg_ids))),
            transport,
            senders: Arc::new(DashMap::new()),
            tasks: DashMap::new(),
        }
    }

    /// Enroll a port and start its task. The returned sender is the port's
    /// inbox; received frames are injected as [`PortEvent::Frame`].
    pub async fn add_port(
        &self,
        cfg: &PortConfig,
        short_timeout: bool,
    ) -> Result<mpsc::Sender<PortEvent>> {
        cfg.validate()?;
        if self.senders.contains_key(&cfg.port) {
            return Err(Error::AlreadyExists(cfg.port.to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        let task = PortTask {
            port: AggPort::new(cfg, short_timeout),
            rxm: RxMachine::new(),
            ptxm: PeriodicMachine::new(),
            txm: TxMachine::new(),
            muxm: MuxMachine::new(),
            churn_actor: ChurnMachine::new(ChurnKind::Actor),
            churn_partner: ChurnMachine::new(ChurnKind::Partner),
            selection: Arc::clone(&self.selection),
            transport: Arc::clone(&self.transport),
            inbox: rx,
            peers: Arc::clone(&self.senders),
        };
        let join = tokio::spawn(task.run());

        self.senders.insert(cfg.port, tx.clone());
        self.tasks.insert(cfg.port, join);
        tx.send(PortEvent::Begin)
            .await
            .map_err(|_| Error::ChannelClosed(cfg.port.to_string()))?;
        Ok(tx)
    }

    pub fn sender(&self, port: PortId) -> Result<mpsc::Sender<PortEvent>> {
        self.senders
            .get(&port)
            .map(|tx| tx.clone())
            .ok_or_else(|| Error::NotFound(port.to_string()))
    }

    /// Inject a received frame into the owning port task
    pub async fn inject_frame(&self, port: PortId, bytes: Vec<u8>) -> Result<()> {
        self.sender(port)?
            .send(PortEvent::Frame(bytes))
            .await
            .map_err(|_| Error::ChannelClosed(port.to_string()))
    }

    /// Take a consistent snapshot of one port's state
    pub async fn snapshot(&self, port: PortId) -> Result<PortSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.sender(port)?
            .send(PortEvent::Query(reply))
            .await
            .map_err(|_| Error::ChannelClosed(port.to_string()))?;
        rx.await.map_err(|_| Error::ChannelClosed(port.to_string()))
    }

    /// Stop one port's task, cancelling its timers
    pub async fn remove_port(&self, port: PortId) -> Result<()> {
        let (_, tx) = self
            .senders
            .remove(&port)
            .ok_or_else(|| Error::NotFound(port.to_string()))?;
        let _ = tx.send(PortEvent::Kill).await;
        if let Some((_, join)) = self.tasks.remove(&port) {
            let _ = join.await;
        }
        Ok(())
    }

    /// Stop every port task
    pub async fn shutdown(&self) {
        let ports: Vec<PortId> = self.senders.iter().map(|e| *e.key()).collect();
        for port in ports {
            let _ = self.remove_port(port).await;
        }
    }
}
