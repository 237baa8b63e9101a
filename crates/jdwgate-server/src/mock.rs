//! In-memory [`Device`] used by unit and integration tests.

use std::{
    collections::VecDeque,
    panic::Location,
    sync::{Arc, Mutex, MutexGuard},
};

use crate::device::{Device, DeviceError, ModuleEntry, ThreadEntry};

/// Call counters recorded by [`MockDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCalls {
    pub attach: usize,
    pub detach: usize,
    pub list_modules: usize,
    pub suspend: usize,
    pub resume: usize,
}

#[derive(Debug, Default)]
struct State {
    modules: Vec<ModuleEntry>,
    threads: Vec<ThreadEntry>,
    console: VecDeque<String>,
    raw_sent: Vec<Vec<u8>>,
    raw_replies: VecDeque<Vec<u8>>,
    attached: bool,
    password: Option<String>,
    required_password: Option<String>,
    fail_list_threads: bool,
    calls: MockCalls,
}

/// A scripted device. Clones share state, so a test can keep one handle
/// while the server owns another.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<State>>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modules(self, modules: Vec<ModuleEntry>) -> Self {
        self.state().modules = modules;
        self
    }

    pub fn with_threads(self, ids: &[u32]) -> Self {
        self.set_threads(ids.iter().map(|id| ThreadEntry { id: *id }).collect());
        self
    }

    /// `attach` fails unless this password is supplied.
    pub fn with_password(self, password: impl Into<String>) -> Self {
        self.state().required_password = Some(password.into());
        self
    }

    pub fn set_threads(&self, threads: Vec<ThreadEntry>) {
        self.state().threads = threads;
    }

    pub fn push_console(&self, line: impl Into<String>) {
        self.state().console.push_back(line.into());
    }

    pub fn push_raw_reply(&self, reply: Vec<u8>) {
        self.state().raw_replies.push_back(reply);
    }

    /// Makes every later `list_threads` call fail with a transport error.
    pub fn fail_list_threads(&self) {
        self.state().fail_list_threads = true;
    }

    pub fn calls(&self) -> MockCalls {
        self.state().calls
    }

    pub fn is_attached(&self) -> bool {
        self.state().attached
    }

    pub fn last_password(&self) -> Option<String> {
        self.state().password.clone()
    }

    pub fn raw_sent(&self) -> Vec<Vec<u8>> {
        self.state().raw_sent.clone()
    }

    #[track_caller]
    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(err) => {
                let loc = Location::caller();
                tracing::error!(
                    target: "jdwgate.mock",
                    file = loc.file(),
                    line = loc.line(),
                    "mock device mutex poisoned; continuing with recovered guard"
                );
                err.into_inner()
            }
        }
    }

    fn attached_state(&self) -> Result<MutexGuard<'_, State>, DeviceError> {
        let state = self.state();
        if state.attached {
            Ok(state)
        } else {
            Err(DeviceError::NotAttached)
        }
    }
}

impl Device for MockDevice {
    fn attach(&mut self, password: Option<&str>) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.attach += 1;
        state.password = password.map(str::to_owned);
        if let Some(required) = &state.required_password {
            if password != Some(required.as_str()) {
                return Err(DeviceError::Rejected {
                    operation: "attach",
                    message: "wrong device password".to_string(),
                });
            }
        }
        state.attached = true;
        Ok(())
    }

    fn detach(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.calls.detach += 1;
        state.attached = false;
        Ok(())
    }

    fn list_modules(&mut self) -> Result<Vec<ModuleEntry>, DeviceError> {
        let mut state = self.attached_state()?;
        state.calls.list_modules += 1;
        Ok(state.modules.clone())
    }

    fn list_threads(&mut self) -> Result<Vec<ThreadEntry>, DeviceError> {
        let state = self.attached_state()?;
        if state.fail_list_threads {
            return Err(DeviceError::Transport("usb channel closed".to_string()));
        }
        Ok(state.threads.clone())
    }

    fn send_raw_command(&mut self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.attached_state()?.raw_sent.push(bytes.to_vec());
        Ok(())
    }

    fn receive_raw_reply(&mut self) -> Result<Vec<u8>, DeviceError> {
        self.attached_state()?
            .raw_replies
            .pop_front()
            .ok_or_else(|| DeviceError::Transport("no reply pending".to_string()))
    }

    fn suspend(&mut self) -> Result<(), DeviceError> {
        self.attached_state()?.calls.suspend += 1;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        self.attached_state()?.calls.resume += 1;
        Ok(())
    }

    fn console_message(&mut self) -> Result<Option<String>, DeviceError> {
        Ok(self.attached_state()?.console.pop_front())
    }
}
