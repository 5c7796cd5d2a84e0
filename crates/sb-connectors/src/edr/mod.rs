//! EDR connectors.

pub mod crowdstrike;

pub use crowdstrike::{CrowdStrikeConfig, CrowdStrikeConnector, DetectionSearch};
