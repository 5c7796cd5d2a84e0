//! Threat intelligence connectors.

pub mod misp;

pub use misp::{AttributeSearch, EventSearch, MispConfig, MispConnector};
