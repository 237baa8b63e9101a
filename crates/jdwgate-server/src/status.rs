use std::{fmt, sync::Arc};

/// Receives human-readable session status lines for external display.
pub type StatusCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Cloneable handle over the injected [`StatusCallback`].
///
/// Every message also becomes an `info` event so status lines show up in logs
/// even when the callback discards them.
#[derive(Clone)]
pub struct StatusReporter {
    callback: StatusCallback,
}

impl StatusReporter {
    pub fn new(callback: StatusCallback) -> Self {
        Self { callback }
    }

    pub fn from_fn(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self::new(Arc::new(callback))
    }

    pub fn silent() -> Self {
        Self::from_fn(|_| {})
    }

    pub fn report(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::info!(target: "jdwgate.status", "{message}");
        (self.callback)(message);
    }
}

impl fmt::Debug for StatusReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusReporter").finish_non_exhaustive()
    }
}
