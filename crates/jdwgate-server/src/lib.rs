//! jdwgate: a JDWP server in front of a device-side VM debug channel.
//!
//! Debugger clients connect over TCP and speak plain JDWP. The gateway
//! answers `VirtualMachine` and `EventRequest` commands from a class list
//! built out of host debug info, and forwards execution control to the
//! device through the [`Device`] collaborator.
//!
//! - [`Server`] owns the listener and one background session thread.
//! - [`Dispatcher`] turns one command packet into one reply.
//! - [`ApplicationRegistry`] and [`VisibleClassList`] hold the per-session
//!   class metadata.

pub mod class_list;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

mod server;
mod session;
mod status;

/// Re-export the wire layer so consumers can depend only on `jdwgate-server`.
pub mod jdwp {
    pub use jdwgate_jdwp::*;
}

/// Configuration model and logging setup.
pub mod config {
    pub use jdwgate_config::*;
}

pub use crate::class_list::{VisibleClass, VisibleClassList, BUILTIN_CLASSES};
pub use crate::device::{
    ClassEntry, DebugSymbols, Device, DeviceError, ModuleDebugInfo, ModuleEntry,
    StaticDebugSymbols, ThreadEntry, HIDDEN_CLASS_ID,
};
pub use crate::dispatch::{Dispatcher, EventRequest, EventRequests};
pub use crate::error::{GatewayError, GatewayResult};
pub use crate::registry::{ApplicationInfo, ApplicationRegistry, RegistryError};
pub use crate::server::Server;
pub use crate::session::SessionEnd;
pub use crate::state::{SessionPhase, SessionState};
pub use crate::status::{StatusCallback, StatusReporter};
pub use jdwgate_config::GatewayConfig;
