//! Common error handling for orabridge crates.
//!
//! We lean on anyhow for error propagation and context chains.
//! Typed errors (see the connector's `RemoteError`) are carried inside
//! `Error` and recovered via downcasting where a caller needs to branch
//! on the failure class.

pub use anyhow::{anyhow, bail, ensure, Context, Error, Result};
