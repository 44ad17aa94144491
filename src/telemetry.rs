//! Tracing subscriber setup.
//!
//! Events go to stderr through a `fmt` layer, filtered by `RUST_LOG` (default `info`).
//! Signature mismatches are logged on the `wxpay::integrity` target and can be routed
//! or silenced independently, e.g. `RUST_LOG=info,wxpay::integrity=warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Builder for the process-wide subscriber.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    name: Option<&'static str>,
    version: Option<&'static str>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }

    /// Installs the subscriber globally.
    ///
    /// Does nothing if a subscriber is already installed.
    pub fn register(self) -> Self {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let installed = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .is_ok();
        if installed {
            tracing::debug!(
                service = self.name.unwrap_or(env!("CARGO_PKG_NAME")),
                version = self.version.unwrap_or(env!("CARGO_PKG_VERSION")),
                "Telemetry initialized"
            );
        }
        self
    }
}
