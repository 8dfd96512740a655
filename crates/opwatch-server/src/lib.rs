//! opwatch server library.
//!
//! Replays newline-delimited change-log records through an opwatch feed and
//! prints the events published under watched names.

pub mod config;
pub mod error;
pub mod printer;
pub mod replay;

pub use config::{Args, ServerConfig};
pub use error::{Error, Result};
pub use printer::{shared_writer, watch, SharedWriter};
pub use replay::{replay, ReplayStats};
