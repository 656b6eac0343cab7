//! Frame transport seam
//!
//! The control plane never touches a NIC directly: egress frames are handed
//! to a [`FrameTransport`], and ingress frames are pushed by the embedder
//! into the owning task's event channel as [`RxFrame`] values. The transport
//! must not reorder frames within one port.

use crate::{PortId, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A received link-layer frame, tagged with the port it arrived on
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub port: PortId,
    pub bytes: Vec<u8>,
}

/// Egress side of the link layer
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Queue one frame for transmission on `port`. May block on
    /// backpressure; completion does not imply the frame hit the wire.
    async fn send(&self, port: PortId, frame: &[u8]) -> Result<()>;

    /// Egress MTU of `port` in octets, link-layer header included
    fn mtu(&self, port: PortId) -> usize;
}

const DEFAULT_MTU: usize = 1500;

/// In-memory transport wiring ports to mpsc receivers. Used by tests and by
/// embedders that loop two stacks back-to-back.
#[derive(Default)]
pub struct ChannelTransport {
    links: Mutex<HashMap<PortId, (PortId, mpsc::Sender<RxFrame>)>>,
    mtus: Mutex<HashMap<PortId, usize>>,
}

impl ChannelTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire `port` so frames sent on it are delivered to `peer_inbox`,
    /// tagged as arriving on `peer_port`.
    pub fn connect(&self, port: PortId, peer_port: PortId, peer_inbox: mpsc::Sender<RxFrame>) {
        self.links
            .lock()
            .unwrap()
            .insert(port, (peer_port, peer_inbox));
    }

    /// Override the MTU reported for `port`
    pub fn set_mtu(&self, port: PortId, mtu: usize) {
        self.mtus.lock().unwrap().insert(port, mtu);
    }

    /// Disconnect `port`; subsequent sends fail with a transport error
    pub fn disconnect(&self, port: PortId) {
        self.links.lock().unwrap().remove(&port);
    }
}

#[async_trait]
impl FrameTransport for ChannelTransport {
    async fn send(&self, port: PortId, frame: &[u8]) -> Result<()> {
        let (peer_port, tx) = {
            let links = self.links.lock().unwrap();
            links
                .get(&port)
                .cloned()
                .ok_or_else(|| crate::Error::transport(format!("{port} not connected")))?
        };
        tx.send(RxFrame {
            port: peer_port,
            bytes: frame.to_vec(),
        })
        .await
        .map_err(|_| crate::Error::transport(format!("{port} peer closed")))
    }

    fn mtu(&self, port: PortId) -> usize {
        self.mtus
            .lock()
            .unwrap()
            .get(&port)
            .copied()
            .unwrap_or(DEFAULT_MTU)
    }
}
