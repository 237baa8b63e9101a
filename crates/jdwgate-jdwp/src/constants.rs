//! JDWP numeric constants (subset used by the gateway).

// Command sets.
pub const CMDSET_VIRTUAL_MACHINE: u8 = 1;
pub const CMDSET_EVENT_REQUEST: u8 = 15;

// VirtualMachine commands.
pub const VM_VERSION: u8 = 1;
pub const VM_ALL_CLASSES: u8 = 3;
pub const VM_ALL_THREADS: u8 = 4;
pub const VM_DISPOSE: u8 = 6;
pub const VM_ID_SIZES: u8 = 7;
pub const VM_SUSPEND: u8 = 8;
pub const VM_RESUME: u8 = 9;
pub const VM_CLASS_PATHS: u8 = 13;

// EventRequest commands.
pub const EVENT_REQUEST_SET: u8 = 1;
pub const EVENT_REQUEST_CLEAR: u8 = 2;
pub const EVENT_REQUEST_CLEAR_ALL_BREAKPOINTS: u8 = 3;

// Error codes.
pub const ERROR_NONE: u16 = 0;
pub const ERROR_ILLEGAL_ARGUMENT: u16 = 103;
pub const ERROR_NOT_IMPLEMENTED: u16 = 99;

// Event kinds.
pub const EVENT_KIND_SINGLE_STEP: u8 = 1;
pub const EVENT_KIND_BREAKPOINT: u8 = 2;

// Event modifier kinds.
pub const MODIFIER_COUNT: u8 = 1;
pub const MODIFIER_CONDITIONAL: u8 = 2;
pub const MODIFIER_THREAD_ONLY: u8 = 3;
pub const MODIFIER_CLASS_ONLY: u8 = 4;
pub const MODIFIER_CLASS_MATCH: u8 = 5;
pub const MODIFIER_CLASS_EXCLUDE: u8 = 6;
pub const MODIFIER_LOCATION_ONLY: u8 = 7;
pub const MODIFIER_EXCEPTION_ONLY: u8 = 8;
pub const MODIFIER_FIELD_ONLY: u8 = 9;
pub const MODIFIER_STEP: u8 = 10;
pub const MODIFIER_INSTANCE_ONLY: u8 = 11;
pub const MODIFIER_SOURCE_NAME_MATCH: u8 = 12;

// Type tags and class status bits.
pub const TYPE_TAG_CLASS: u8 = 1;
pub const CLASS_STATUS_INITIALIZED: i32 = 4;

/// Width in bytes of every JDWP identifier the gateway emits.
///
/// The device speaks 32-bit identifiers; `IDSizes` always advertises this
/// value for all five identifier kinds.
pub const ID_SIZE: usize = 4;
