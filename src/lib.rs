//! # sitecoord
//!
//! Node-local coordination for distributed MapReduce transactions in a
//! partitioned, main-memory transaction engine.
//!
//! Each Map request runs one fragment per local partition. Partitions report
//! completion concurrently; the site answers the remote coordinator exactly
//! once, after all of them reported (via the shuffle pipeline) or as soon as
//! the transaction aborts (with a partial, back-filled response).
//!
//! ## Modules
//!
//! - `coordination` - Countdown callback, Map-phase coordinator, response, pool
//! - `txn` - Transaction handle and phase machine
//! - `site` - Site controller context and the partition-thread simulation
//! - `shuffle` - Shuffle worker queue consuming transactions after Map
//! - `config` - Site configuration file loading and validation
//! - `error` - Error types and stable error codes
//! - `app` - Logging and command-line configuration for the binary
//! - `testing` - Mock collaborators and fixtures
pub mod app;
pub mod config;
pub mod coordination;
pub mod error;
pub mod shuffle;
pub mod site;
pub mod txn;

pub mod testing;
