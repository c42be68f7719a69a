//! txlog - Transaction log and restore
//!
//! Records every accepted create/overwrite and delete as an ordered entry in
//! a durable log, and replays a source's log through the saga engine to
//! rebuild state.
//!
//! - `steps`: saga steps that append to the log on the live write path
//! - `pool`: source to topic resolution and shared producers
//! - `codec`: entry encoding
//! - `restore`: replay sessions and the single-flight registry

pub mod codec;
pub mod config;
pub mod id;
pub mod operation;
pub mod pool;
pub mod restore;
pub mod saga;
pub mod steps;
pub mod transport;
pub mod utils;
