//! Runtime glue: configuration, fatal error routing, persisted state, telemetry, and the
//! runner that supervises poller/pipeline pairs.

pub(crate) mod retry;
pub mod config;
pub mod fatal;
pub mod runner;
pub mod state;
pub mod telemetry;
