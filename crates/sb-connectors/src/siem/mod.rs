//! SIEM connectors.

pub mod splunk;

pub use splunk::{DispatchState, SearchJob, SplunkConfig, SplunkConnector, SplunkSearch};
