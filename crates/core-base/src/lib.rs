//! Shared front-end and filter-lifecycle machinery for the gamma tools.
//!
//! Every tool contributes the same four things: its usage line, a handler
//! for its own options, a validator for the leftover arguments, and a
//! `start` that fills ramps and drives the install. Everything else lives
//! here: the common option walker, configuration-file parsing, CRTC
//! resolution, ramp coalescing across CRTCs with identical geometry, the
//! asynchronous install loop, and the keep-alive phase.

pub mod args;
pub mod config;
pub mod proc;
mod run;
mod session;

pub use run::{CommonOpts, RunError, Tool, run};
pub use session::{KeepAliveEnd, Session, UpdateSlot, lifespan_from_flags};

/// Package prefix of every filter class.
pub const PKGNAME: &str = "cg-tools";

/// Compose a filter class from the program name and rule.
pub fn filter_class(program: &str, rule: &str) -> String {
    format!("{PKGNAME}::{program}::{rule}")
}

/// Install the stderr logging layer. Diagnostics for the user go through
/// plain stderr prints; tracing carries the ambient telemetry underneath
/// and stays silent unless `RUST_LOG` asks for it.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
