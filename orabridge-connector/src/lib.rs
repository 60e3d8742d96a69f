//! Oracle-dialect connectivity and query pushdown engine.
//!
//! Given already-resolved table metadata from the host query planner, this
//! crate caches remote connection and statement handles, translates a subset
//! of relational expressions into the remote dialect's SQL text, and marshals
//! rows and parameters between the local type system and the remote driver's
//! wire representation.

mod cache;
pub use cache::*;
mod client;
pub use client::*;
mod conf;
pub use conf::*;
mod deparse;
pub use deparse::*;
mod describe;
pub use describe::*;
mod error;
pub use error::*;
mod executor;
pub use executor::*;
mod params;
pub use params::*;
mod query;
pub use query::*;
mod rows;
pub use rows::*;
mod session;
pub use session::*;
mod types;
pub use types::*;

pub mod testing;
