//! Command dispatch: one decoded command in, one reply packet out.

use jdwgate_config::VmConfig;
use jdwgate_jdwp::{
    constants::*, Command, EventRequestSpec, FieldBuffer, JdwpError, Packet, PacketBody,
};

use crate::{
    class_list::VisibleClassList, device::Device, error::GatewayResult, state::SessionState,
};

/// An active `EventRequest.Set` registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRequest {
    pub request_id: i32,
    pub spec: EventRequestSpec,
}

/// Event requests registered by the debugger during one session.
///
/// Request ids are unique within the session and never zero.
#[derive(Debug, Clone)]
pub struct EventRequests {
    next_id: i32,
    active: Vec<EventRequest>,
}

impl Default for EventRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRequests {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            active: Vec::new(),
        }
    }

    /// Stores the request and returns its id. After wrapping past
    /// `i32::MAX`, ids still held by active requests are skipped.
    pub fn register(&mut self, spec: EventRequestSpec) -> i32 {
        let mut request_id = self.advance();
        while self.get(request_id).is_some() {
            request_id = self.advance();
        }
        self.active.push(EventRequest { request_id, spec });
        request_id
    }

    fn advance(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = id.checked_add(1).unwrap_or(1);
        id
    }

    /// Removes the request; unknown ids are ignored.
    pub fn clear(&mut self, event_kind: u8, request_id: i32) -> bool {
        let before = self.active.len();
        self.active
            .retain(|r| !(r.request_id == request_id && r.spec.event_kind == event_kind));
        self.active.len() != before
    }

    pub fn clear_kind(&mut self, event_kind: u8) -> usize {
        let before = self.active.len();
        self.active.retain(|r| r.spec.event_kind != event_kind);
        before - self.active.len()
    }

    pub fn get(&self, request_id: i32) -> Option<&EventRequest> {
        self.active.iter().find(|r| r.request_id == request_id)
    }

    /// Active requests for `event_kind`, in registration order.
    pub fn matching(&self, event_kind: u8) -> impl Iterator<Item = &EventRequest> {
        self.active
            .iter()
            .filter(move |r| r.spec.event_kind == event_kind)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

pub struct Dispatcher {
    vm: VmConfig,
    classes: VisibleClassList,
    requests: EventRequests,
}

impl Dispatcher {
    pub fn new(vm: VmConfig, classes: VisibleClassList) -> Self {
        Self {
            vm,
            classes,
            requests: EventRequests::new(),
        }
    }

    pub fn classes(&self) -> &VisibleClassList {
        &self.classes
    }

    pub fn event_requests(&self) -> &EventRequests {
        &self.requests
    }

    /// Handles one packet from the debugger.
    ///
    /// Returns `Ok(None)` for packets that take no reply. Malformed payloads
    /// and unknown commands are answered with a JDWP error code; only device
    /// failures and encoding failures are returned as errors.
    pub fn dispatch(
        &mut self,
        packet: &Packet,
        state: &mut SessionState,
        device: &mut dyn Device,
    ) -> GatewayResult<Option<Packet>> {
        let PacketBody::Command {
            command_set,
            command,
            payload,
        } = &packet.body
        else {
            tracing::debug!(target: "jdwgate.dispatch", id = packet.id, "ignoring reply packet from debugger");
            return Ok(None);
        };

        let parsed = match Command::parse(*command_set, *command, payload) {
            Ok(parsed) => parsed,
            Err(JdwpError::CommandFormat(reason)) => {
                tracing::warn!(
                    target: "jdwgate.dispatch",
                    id = packet.id,
                    command_set,
                    command,
                    %reason,
                    "malformed command payload"
                );
                return Ok(Some(Packet::reply(packet.id, ERROR_ILLEGAL_ARGUMENT, Vec::new())));
            }
            Err(err) => return Err(err.into()),
        };

        self.execute(packet.id, parsed, state, device).map(Some)
    }

    fn execute(
        &mut self,
        id: u32,
        command: Command,
        state: &mut SessionState,
        device: &mut dyn Device,
    ) -> GatewayResult<Packet> {
        let mut w = FieldBuffer::new();
        match command {
            Command::Version => {
                w.append_string(&self.vm.description)?;
                w.append_int32(self.vm.jdwp_major);
                w.append_int32(self.vm.jdwp_minor);
                w.append_string(&self.vm.vm_version)?;
                w.append_string(&self.vm.vm_name)?;
            }
            Command::IdSizes => {
                // field, method, object, reference type, frame
                for _ in 0..5 {
                    w.append_int32(ID_SIZE as i32);
                }
            }
            Command::AllClasses => {
                append_count(&mut w, self.classes.len())?;
                for class in self.classes.iter() {
                    w.append_byte(TYPE_TAG_CLASS);
                    w.append_u32(class.type_id);
                    w.append_string(&class.entry.signature())?;
                    w.append_int32(CLASS_STATUS_INITIALIZED);
                }
            }
            Command::AllThreads => {
                let threads = device.list_threads()?;
                append_count(&mut w, threads.len())?;
                for thread in threads {
                    w.append_u32(thread.id);
                }
            }
            Command::Suspend => {
                device.suspend()?;
                state.suspend();
            }
            Command::Resume => {
                device.resume()?;
                state.resume();
            }
            Command::ClassPaths => {
                w.append_string(&self.vm.base_dir)?;
                append_strings(&mut w, &self.vm.class_paths)?;
                append_strings(&mut w, &self.vm.boot_class_paths)?;
            }
            Command::Dispose => {
                tracing::info!(target: "jdwgate.dispatch", "debugger disposed the session");
                state.dispose();
            }
            Command::EventRequestSet(spec) => {
                let kind = spec.event_kind;
                let request_id = self.requests.register(spec);
                tracing::debug!(target: "jdwgate.dispatch", kind, request_id, "event request set");
                w.append_int32(request_id);
            }
            Command::EventRequestClear {
                event_kind,
                request_id,
            } => {
                let removed = self.requests.clear(event_kind, request_id);
                tracing::debug!(target: "jdwgate.dispatch", event_kind, request_id, removed, "event request clear");
            }
            Command::ClearAllBreakpoints => {
                let removed = self.requests.clear_kind(EVENT_KIND_BREAKPOINT);
                tracing::debug!(target: "jdwgate.dispatch", removed, "cleared breakpoints");
            }
            Command::Unsupported {
                command_set,
                command,
            } => {
                tracing::debug!(target: "jdwgate.dispatch", id, command_set, command, "command not implemented");
                return Ok(Packet::reply(id, ERROR_NOT_IMPLEMENTED, Vec::new()));
            }
        }
        Ok(Packet::reply(id, ERROR_NONE, w.into_vec()))
    }
}

fn append_count(w: &mut FieldBuffer, len: usize) -> Result<(), JdwpError> {
    let count = i32::try_from(len).map_err(|_| JdwpError::FieldTooLarge(len))?;
    w.append_int32(count);
    Ok(())
}

fn append_strings(w: &mut FieldBuffer, items: &[String]) -> Result<(), JdwpError> {
    append_count(w, items.len())?;
    for item in items {
        w.append_string(item)?;
    }
    Ok(())
}
