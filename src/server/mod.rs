//! Broker server: transport setup, configuration, and the dispatch loop

pub mod broker;
pub mod config;

pub use broker::Broker;
pub use config::{BrokerConfig, DEFAULT_PORT};
