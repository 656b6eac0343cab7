//! Linkagg Core Library
//!
//! This crate provides the fundamental types, error handling, configuration
//! model, and transport seam shared by the linkagg 802.1AX control plane.

pub mod config;
pub mod error;
pub mod timer;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use config::{ConvAdminTable, IppConfig, LacpMode, PartnerAdminConfig, PortConfig, PortalConfig};
pub use error::{Error, Result};
pub use timer::Deadline;
pub use transport::{ChannelTransport, FrameTransport, RxFrame};
pub use types::*;
