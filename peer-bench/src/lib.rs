//! Peer-to-peer request/response and bandwidth benchmarks.
//!
//! A run is a fixed set of peers identified by rank, connected in a full TCP
//! mesh. Two benchmarks share the same transport:
//!
//! - **lookup**: the first `servers` ranks hold identical read-only tables
//!   and answer GET requests; every other rank is a closed-loop client that
//!   spreads its requests round-robin over the servers.
//! - **alltoall**: every peer exchanges a fixed-size chunk with every other
//!   peer per epoch and times each epoch.
//!
//! Modules:
//!
//! - [`transport`] tagged point-to-point messaging with blocking and
//!   non-blocking operations.
//! - [`message`] fixed-size wire records.
//! - [`table`] the replicated lookup table.
//! - [`role`] rank to role assignment.
//! - [`server`] and [`client`] the two sides of the lookup benchmark.
//! - [`harness`] the all-to-all benchmark.
//! - [`metrics`] duration aggregation.
//! - [`config`], [`cli`] and [`runner`] wire the pieces together.

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod harness;
pub mod message;
pub mod metrics;
pub mod role;
pub mod runner;
pub mod server;
pub mod table;
pub mod transport;

pub use error::{Error, Result};
