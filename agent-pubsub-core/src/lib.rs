//! Core types for agent-pubsub
//!
//! This crate provides the in-process pub/sub bus that lets remote
//! observers watch and steer an agent session, together with the
//! configuration, error and logging plumbing shared by the other crates.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

pub use error::{Error, Result};
