//! # sb-tools
//!
//! Tool surface for secbridge connectors. Each tool maps caller arguments
//! onto one connector operation, and the [`ToolRegistry`] turns the outcome
//! into a [`ToolOutput`] that never carries backend detail.

pub mod crowdstrike;
pub mod misp;
pub mod registry;
pub mod splunk;

pub use registry::{
    ParameterDef, ParameterType, Tool, ToolArguments, ToolDefinition, ToolOutput, ToolRegistry,
};

pub use crowdstrike::CrowdStrikeSearchDetectionsTool;
pub use misp::{MispSearchAttributesTool, MispSearchEventsTool};
pub use splunk::SplunkSearchEventsTool;
