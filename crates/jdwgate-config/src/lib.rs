//! Configuration for the jdwgate debug gateway.
//!
//! Config files are TOML. Every key is optional; missing keys take the
//! defaults documented on each field. Unknown keys are rejected so typos do
//! not silently fall back to defaults.

use std::{
    io,
    path::{Path, PathBuf},
    sync::{Arc, Once},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    layer::SubscriberExt,
    EnvFilter, Layer,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value.message().to_owned())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub vm: VmConfig,
    pub logging: LoggingConfig,
}

impl GatewayConfig {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::load_from_str(&text)
    }

    pub fn load_from_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the JDWP listener binds to.
    ///
    /// Empty means all interfaces. Host names are resolved when the server
    /// starts.
    pub address: String,

    pub port: u16,

    /// How long a freshly accepted client may take to send the handshake.
    pub handshake_timeout_ms: u64,

    /// Upper bound on the `length` header field of incoming packets.
    pub max_packet_bytes: usize,

    /// Poll interval for device console output while the target is running.
    pub console_poll_interval_ms: u64,
}

impl ServerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn console_poll_interval(&self) -> Duration {
        Duration::from_millis(self.console_poll_interval_ms.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 8000,
            handshake_timeout_ms: 10_000,
            max_packet_bytes: 1024 * 1024,
            console_poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Password used to open the device debug channel, if the device is locked.
    pub password: Option<String>,
}

/// What the gateway reports about the remote VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmConfig {
    pub description: String,
    pub jdwp_major: i32,
    pub jdwp_minor: i32,
    pub vm_version: String,
    pub vm_name: String,
    pub base_dir: String,
    pub class_paths: Vec<String>,
    pub boot_class_paths: Vec<String>,
    /// Append the runtime's built-in classes after the application classes.
    pub include_builtin_classes: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            description: "RIM JVM".to_owned(),
            jdwp_major: 1,
            jdwp_minor: 4,
            vm_version: "1.4".to_owned(),
            vm_name: "RIM JVM".to_owned(),
            base_dir: String::new(),
            class_paths: Vec::new(),
            boot_class_paths: Vec::new(),
            include_builtin_classes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Either a simple level (`info`, `debug`, ...) or an `EnvFilter`
    /// directive string.
    pub level: String,

    /// Emit logs in JSON format.
    pub json: bool,

    /// Mirror logs to stderr.
    pub stderr: bool,

    /// Append logs to the given file path. If the file cannot be opened, file
    /// logging is disabled while stderr logging remains active.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    /// Lower-cases bare level names and accepts `warning` for `warn`. Anything
    /// else is passed through as `EnvFilter` directives.
    pub(crate) fn normalize_level_directives(input: &str) -> String {
        let level = input.trim();
        if level.is_empty() {
            return Self::default_level();
        }
        match level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_owned(),
            bare @ ("trace" | "debug" | "info" | "warn" | "error") => bare.to_owned(),
            _ => level.to_owned(),
        }
    }

    /// Effective filter: configured level, extended by `RUST_LOG` when set.
    /// Unparseable directives fall back to `info`.
    pub fn env_filter(&self) -> EnvFilter {
        let mut directives = Self::normalize_level_directives(&self.level);
        if let Some(env) = std::env::var("RUST_LOG")
            .ok()
            .filter(|value| !value.trim().is_empty())
        {
            directives = format!("{directives},{}", env.trim());
        }
        EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: true,
            file: None,
        }
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times; only the first call has an effect.
pub fn init_tracing(logging: &LoggingConfig) {
    TRACING_INIT.call_once(|| {
        let filter = logging.env_filter();

        let file = logging.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = logging.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if logging.stderr {
            // Keep `cargo test` output capture working in debug builds.
            if cfg!(debug_assertions) {
                make_writer = BoxMakeWriter::new(
                    make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr),
                );
            } else {
                make_writer = BoxMakeWriter::new(make_writer.and(io::stderr));
            }
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(Arc::new(file)));
        }

        let layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() && file_open_failed {
            if let Some(path) = logging.file.as_ref() {
                tracing::warn!(
                    target: "jdwgate.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
}
