use crate::{constants::*, FieldReader, JdwpError, Result};

/// Code location as carried by `LocationOnly` modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub type_tag: u8,
    pub class_id: u64,
    pub method_id: u64,
    pub index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventModifier {
    Count { count: i32 },
    Conditional { expr_id: i32 },
    ThreadOnly { thread: u64 },
    ClassOnly { class_id: u64 },
    ClassMatch { pattern: String },
    ClassExclude { pattern: String },
    LocationOnly { location: Location },
    ExceptionOnly {
        exception_or_null: u64,
        caught: bool,
        uncaught: bool,
    },
    FieldOnly { class_id: u64, field_id: u64 },
    Step { thread: u64, size: i32, depth: i32 },
    InstanceOnly { object_id: u64 },
    SourceNameMatch { pattern: String },
}

/// Body of an `EventRequest.Set` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequestSpec {
    pub event_kind: u8,
    pub suspend_policy: u8,
    pub modifiers: Vec<EventModifier>,
}

/// A decoded command, keyed by `(commandSet, command)`.
///
/// Payloads are parsed field-by-field here; handlers never look at raw
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Version,
    AllClasses,
    AllThreads,
    Dispose,
    IdSizes,
    Suspend,
    Resume,
    ClassPaths,
    EventRequestSet(EventRequestSpec),
    EventRequestClear { event_kind: u8, request_id: i32 },
    ClearAllBreakpoints,
    /// Any pair the gateway does not implement; answered with
    /// `NOT_IMPLEMENTED`.
    Unsupported { command_set: u8, command: u8 },
}

impl Command {
    /// Parses a command payload.
    ///
    /// Returns [`JdwpError::CommandFormat`] when the payload does not match the
    /// shape required by a supported command. Unsupported pairs never fail.
    pub fn parse(command_set: u8, command: u8, payload: &[u8]) -> Result<Self> {
        let mut r = FieldReader::new(payload);
        let parsed = match (command_set, command) {
            (CMDSET_VIRTUAL_MACHINE, VM_VERSION) => Command::Version,
            (CMDSET_VIRTUAL_MACHINE, VM_ALL_CLASSES) => Command::AllClasses,
            (CMDSET_VIRTUAL_MACHINE, VM_ALL_THREADS) => Command::AllThreads,
            (CMDSET_VIRTUAL_MACHINE, VM_DISPOSE) => Command::Dispose,
            (CMDSET_VIRTUAL_MACHINE, VM_ID_SIZES) => Command::IdSizes,
            (CMDSET_VIRTUAL_MACHINE, VM_SUSPEND) => Command::Suspend,
            (CMDSET_VIRTUAL_MACHINE, VM_RESUME) => Command::Resume,
            (CMDSET_VIRTUAL_MACHINE, VM_CLASS_PATHS) => Command::ClassPaths,
            (CMDSET_EVENT_REQUEST, EVENT_REQUEST_SET) => {
                Command::EventRequestSet(read_event_request(&mut r)?)
            }
            (CMDSET_EVENT_REQUEST, EVENT_REQUEST_CLEAR) => Command::EventRequestClear {
                event_kind: r.read_u8()?,
                request_id: r.read_i32()?,
            },
            (CMDSET_EVENT_REQUEST, EVENT_REQUEST_CLEAR_ALL_BREAKPOINTS) => {
                Command::ClearAllBreakpoints
            }
            _ => return Ok(Command::Unsupported { command_set, command }),
        };
        r.finish()?;
        Ok(parsed)
    }
}

fn read_event_request(r: &mut FieldReader<'_>) -> Result<EventRequestSpec> {
    let event_kind = r.read_u8()?;
    let suspend_policy = r.read_u8()?;
    let count = r.read_i32()?;

    // Every modifier takes at least its kind byte, so a count larger than the
    // remaining input can be rejected before allocating anything.
    let count = usize::try_from(count)
        .ok()
        .filter(|count| *count <= r.remaining())
        .ok_or_else(|| {
            JdwpError::CommandFormat(format!(
                "modifier count {count} does not fit {} payload bytes",
                r.remaining()
            ))
        })?;

    let mut modifiers = Vec::with_capacity(count);
    for _ in 0..count {
        modifiers.push(read_modifier(r)?);
    }

    Ok(EventRequestSpec {
        event_kind,
        suspend_policy,
        modifiers,
    })
}

fn read_modifier(r: &mut FieldReader<'_>) -> Result<EventModifier> {
    let kind = r.read_u8()?;
    let modifier = match kind {
        MODIFIER_COUNT => EventModifier::Count {
            count: r.read_i32()?,
        },
        MODIFIER_CONDITIONAL => EventModifier::Conditional {
            expr_id: r.read_i32()?,
        },
        MODIFIER_THREAD_ONLY => EventModifier::ThreadOnly {
            thread: r.read_id(ID_SIZE)?,
        },
        MODIFIER_CLASS_ONLY => EventModifier::ClassOnly {
            class_id: r.read_id(ID_SIZE)?,
        },
        MODIFIER_CLASS_MATCH => EventModifier::ClassMatch {
            pattern: r.read_string()?,
        },
        MODIFIER_CLASS_EXCLUDE => EventModifier::ClassExclude {
            pattern: r.read_string()?,
        },
        MODIFIER_LOCATION_ONLY => EventModifier::LocationOnly {
            location: Location {
                type_tag: r.read_u8()?,
                class_id: r.read_id(ID_SIZE)?,
                method_id: r.read_id(ID_SIZE)?,
                index: r.read_u64()?,
            },
        },
        MODIFIER_EXCEPTION_ONLY => EventModifier::ExceptionOnly {
            exception_or_null: r.read_id(ID_SIZE)?,
            caught: r.read_bool()?,
            uncaught: r.read_bool()?,
        },
        MODIFIER_FIELD_ONLY => EventModifier::FieldOnly {
            class_id: r.read_id(ID_SIZE)?,
            field_id: r.read_id(ID_SIZE)?,
        },
        MODIFIER_STEP => EventModifier::Step {
            thread: r.read_id(ID_SIZE)?,
            size: r.read_i32()?,
            depth: r.read_i32()?,
        },
        MODIFIER_INSTANCE_ONLY => EventModifier::InstanceOnly {
            object_id: r.read_id(ID_SIZE)?,
        },
        MODIFIER_SOURCE_NAME_MATCH => EventModifier::SourceNameMatch {
            pattern: r.read_string()?,
        },
        other => {
            return Err(JdwpError::CommandFormat(format!(
                "unknown event modifier kind {other}"
            )))
        }
    };
    Ok(modifier)
}
