//! Convergence engine for the collector management agent.
//!
//! The agent polls the control plane for pending actions, installs collector
//! configuration files, reloads the affected collectors, runs lifecycle
//! commands, watches installed files for out-of-band modification, and
//! reports every outcome back to the control plane.

pub mod actions;
pub mod client;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod executor;
pub mod installer;
pub mod inventory;
pub mod io;
pub mod notify;
pub mod paths;
pub mod platform;
pub mod poller;
pub mod registration;
pub mod reload;
pub mod results;
pub mod status;
pub mod tracker;

pub use error::{AgentError, Result};
