//! Interfaces to the two external collaborators: the device transport that
//! reaches the remote VM, and the host-side debug symbol store.

use std::{collections::HashMap, io};

use thiserror::Error;

/// Device id marking a class that is loaded but must not be shown to the
/// debugger.
pub const HIDDEN_CLASS_ID: u32 = 0xFFFF_FFFF;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device transport failure: {0}")]
    Transport(String),
    #[error("device rejected {operation}: {message}")]
    Rejected {
        operation: &'static str,
        message: String,
    },
    #[error("device channel is not attached")]
    NotAttached,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One binary module installed on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    /// Per-boot handle assigned by the device.
    pub id: u32,
    /// Stable identity shared by all modules of one application.
    pub unique_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadEntry {
    pub id: u32,
}

/// Vendor debug channel of one device.
///
/// Calls are synchronous: the session runner invokes them between socket
/// reads and never concurrently.
pub trait Device: Send {
    /// Opens the debug channel. `password` unlocks a protected device.
    fn attach(&mut self, password: Option<&str>) -> Result<(), DeviceError>;

    fn detach(&mut self) -> Result<(), DeviceError>;

    fn list_modules(&mut self) -> Result<Vec<ModuleEntry>, DeviceError>;

    fn list_threads(&mut self) -> Result<Vec<ThreadEntry>, DeviceError>;

    /// Sends an already framed vendor-protocol request.
    fn send_raw_command(&mut self, bytes: &[u8]) -> Result<(), DeviceError>;

    fn receive_raw_reply(&mut self) -> Result<Vec<u8>, DeviceError>;

    fn suspend(&mut self) -> Result<(), DeviceError>;

    fn resume(&mut self) -> Result<(), DeviceError>;

    /// Next line of console output from the running VM, if any is pending.
    fn console_message(&mut self) -> Result<Option<String>, DeviceError> {
        Ok(None)
    }

    /// One vendor-protocol round trip.
    fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DeviceError> {
        self.send_raw_command(request)?;
        self.receive_raw_reply()
    }
}

/// A class described by host-side debug info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub class_name: String,
    /// Dotted package, empty for the default package.
    pub class_path: String,
    pub source_file: String,
    pub type_code: u32,
    /// Device-side class id. [`HIDDEN_CLASS_ID`] hides the class.
    pub id: u32,
}

impl ClassEntry {
    pub fn new(class_path: impl Into<String>, class_name: impl Into<String>, id: u32) -> Self {
        Self {
            class_name: class_name.into(),
            class_path: class_path.into(),
            source_file: String::new(),
            type_code: 0,
            id,
        }
    }

    /// Fully qualified dotted name.
    pub fn full_name(&self) -> String {
        if self.class_path.is_empty() {
            self.class_name.clone()
        } else {
            format!("{}.{}", self.class_path, self.class_name)
        }
    }

    /// JNI-style signature, e.g. `Lcom/example/Main;`.
    pub fn signature(&self) -> String {
        format!("L{};", self.full_name().replace('.', "/"))
    }

    pub fn is_hidden(&self) -> bool {
        self.id == HIDDEN_CLASS_ID
    }
}

/// Debug info for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDebugInfo {
    pub unique_id: u32,
    pub app_name: String,
    pub classes: Vec<ClassEntry>,
}

/// Host-side store of module debug info.
pub trait DebugSymbols: Send + Sync {
    /// Debug info for the module with this identity and name, if the host has
    /// it.
    fn lookup(&self, unique_id: u32, module_name: &str) -> Option<ModuleDebugInfo>;
}

/// Debug info held in memory, keyed by module name.
#[derive(Debug, Clone, Default)]
pub struct StaticDebugSymbols {
    modules: HashMap<String, ModuleDebugInfo>,
}

impl StaticDebugSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module_name: impl Into<String>, info: ModuleDebugInfo) -> Self {
        self.insert(module_name, info);
        self
    }

    pub fn insert(&mut self, module_name: impl Into<String>, info: ModuleDebugInfo) {
        self.modules.insert(module_name.into(), info);
    }
}

impl DebugSymbols for StaticDebugSymbols {
    fn lookup(&self, unique_id: u32, module_name: &str) -> Option<ModuleDebugInfo> {
        // A rebuilt module keeps its name but gets a new identity; stale debug
        // info must not be attached to it.
        self.modules
            .get(module_name)
            .filter(|info| info.unique_id == unique_id)
            .cloned()
    }
}
