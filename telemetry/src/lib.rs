//! Standardized logging for bucketcp.
//!
//! Start with [`TelemetryConfig::new()`], call [`TelemetryConfig::init()`] once at
//! the top of `main`, and [`TelemetryFlusher::flush()`] right before exiting.

use std::io::{IsTerminal as _, Write as _};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter,
};

/// The toplevel config for the bucketcp-telemetry crate. Start here.
#[derive(Debug)]
pub struct TelemetryConfig {
    default_level: LevelFilter,
    global_filter: Option<EnvFilter>,
}

impl TelemetryConfig {
    #[expect(clippy::new_without_default, reason = "may add required args later")]
    #[must_use]
    pub fn new() -> Self {
        Self {
            default_level: LevelFilter::INFO,
            global_filter: None,
        }
    }

    /// Raises the default level by one step per `-v` flag. `RUST_LOG` still wins.
    #[must_use]
    pub fn with_verbosity(self, verbosity: u8) -> Self {
        Self {
            default_level: level_for_verbosity(verbosity),
            ..self
        }
    }

    /// Override the global filter to a custom filter, ignoring `RUST_LOG` and the
    /// verbosity entirely.
    #[must_use]
    pub fn with_global_filter(self, filter: EnvFilter) -> Self {
        Self {
            global_filter: Some(filter),
            ..self
        }
    }

    pub fn try_init(
        self,
    ) -> Result<TelemetryFlusher, tracing_subscriber::util::TryInitError> {
        let global_filter = self.global_filter.unwrap_or_else(|| {
            EnvFilter::builder()
                .with_default_directive(self.default_level.into())
                .from_env_lossy()
        });
        // The type is only there to get it to compile.
        let tokio_console_layer: Option<tracing_subscriber::layer::Identity> = None;
        #[cfg(tokio_unstable)]
        let tokio_console_layer = console_subscriber::spawn();
        let stderr_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal());

        tracing_subscriber::registry()
            .with(tokio_console_layer)
            .with(stderr_layer)
            .with(global_filter)
            .try_init()?;

        Ok(TelemetryFlusher { _private: () })
    }

    /// Initializes the telemetry config. Call this only once, at the beginning of the
    /// program.
    ///
    /// Calling this more than once or when another tracing subscriber is registered
    /// will cause a panic.
    pub fn init(self) -> TelemetryFlusher {
        self.try_init()
            .expect("failed to initialize bucketcp-telemetry")
    }
}

fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Allows flushing all telemetry logs.
#[must_use = "call .flush at the end of the program, otherwise logs may get lost"]
pub struct TelemetryFlusher {
    _private: (),
}

impl TelemetryFlusher {
    /// Call this at the end of the program.
    pub async fn flush(self) {
        // technically blocks, but no one really cares for stderr/out.
        self.flush_blocking()
    }

    /// Call this at the end of the program.
    pub fn flush_blocking(self) {
        std::io::stderr().flush().ok();
        std::io::stdout().flush().ok();
    }
}
