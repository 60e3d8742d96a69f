//! Process-wide logging for the orabridge crates, built on `log` with an
//! `env_logger` backend.
//!
//! Callers import the macros from here (`use orabridge_logging::debug;`)
//! and never depend on the backend crate directly.

use orabridge_core::err::Result;
pub use env_logger::{init, init_from_env};
pub use log::*;

/// Installs the logger for this process. Defaults to `info` when
/// `RUST_LOG` is unset.
pub fn init_logging() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    Ok(())
}

/// Captured trace-level logger for test binaries; safe to call from
/// every test since repeat installs are ignored.
pub fn init_for_tests() {
    let res = env_logger::builder()
        .filter_module("orabridge", LevelFilter::Trace)
        .is_test(true)
        .try_init();
    if let Err(err) = res {
        eprintln!("Failed to init logging: {}", err);
    }
}
