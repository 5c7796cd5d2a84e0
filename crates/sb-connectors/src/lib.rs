//! # sb-connectors
//!
//! Backend connectors for secbridge: CrowdStrike detection search, MISP
//! threat-intel search and Splunk asynchronous log search.
//!
//! Each connector validates caller input, obtains a credential through its
//! [`credential::CredentialManager`], issues its HTTP calls through a
//! [`http::Transport`] and filters the records it returns with a
//! [`sanitize::RecordSanitizer`].

pub mod credential;
pub mod edr;
pub mod http;
pub mod sanitize;
pub mod secure_string;
pub mod siem;
pub mod testing;
pub mod threat_intel;
pub mod traits;
pub mod validation;
pub mod xml;

pub use secure_string::SecureString;
pub use traits::{Connector, ConnectorConfig, ConnectorError, ConnectorResult};

pub use credential::{Credential, CredentialManager, LoginExchange, SecretObserver};
pub use http::{HttpClient, HttpRequest, HttpResponse, Transport};
pub use sanitize::{FieldRule, RecordSanitizer};
pub use validation::TimeRange;

// Re-export connector implementations
pub use edr::{CrowdStrikeConfig, CrowdStrikeConnector};
pub use siem::{DispatchState, SearchJob, SplunkConfig, SplunkConnector};
pub use threat_intel::{MispConfig, MispConnector};
