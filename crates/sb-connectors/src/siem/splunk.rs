//! Splunk log search connector.
//!
//! A search runs as an asynchronous job: submit it, poll its dispatch state
//! until it is done, failed or out of attempts, then fetch the results once.

use crate::credential::{
    CredentialManager, LoginExchange, SecretObserver, SplunkSessionLogin, StaticKey,
    DEFAULT_SESSION_TTL,
};
use crate::http::{HttpClient, HttpRequest, HttpResponse, Transport};
use crate::sanitize::RecordSanitizer;
use crate::secure_string::SecureString;
use crate::traits::{Connector, ConnectorConfig, ConnectorError, ConnectorResult};
use crate::validation::{clamp_limit, sanitize_text, TimeRange, MAX_SPLUNK_COUNT, SPL_QUERY};
use crate::xml;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Job submission endpoint.
pub const JOBS_PATH: &str = "/services/search/jobs";

/// Splunk-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplunkConfig {
    /// Base connector configuration.
    #[serde(flatten)]
    pub connector: ConnectorConfig,
    /// Username for session login.
    #[serde(default)]
    pub username: String,
    /// Password for session login.
    #[serde(default)]
    pub password: SecureString,
    /// Pre-issued token; takes precedence over username/password.
    #[serde(default)]
    pub token: SecureString,
    /// Delay between job status polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of job status polls.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Assumed lifetime of a login session in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Maximum results per search.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    30
}

fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL.as_secs()
}

fn default_max_results() -> u32 {
    MAX_SPLUNK_COUNT
}

impl SplunkConfig {
    /// Creates a configuration with defaults and no credentials.
    pub fn new(base_url: &str) -> Self {
        Self {
            connector: ConnectorConfig::new("splunk", base_url),
            username: String::new(),
            password: SecureString::default(),
            token: SecureString::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_attempts: default_max_poll_attempts(),
            session_ttl_secs: default_session_ttl_secs(),
            max_results: default_max_results(),
        }
    }

    /// Returns the secret values held by this configuration.
    pub fn secrets(&self) -> Vec<String> {
        [&self.password, &self.token]
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.expose_secret().to_string())
            .collect()
    }
}

/// Job lifecycle state as reported by `dispatchState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DispatchState {
    /// Queued, parsing, running, finalizing or paused.
    Running,
    /// Results are ready.
    Done,
    /// The job failed server-side.
    Failed,
    /// Not yet observed, or a value this client does not know.
    Unknown,
}

impl DispatchState {
    /// Maps a Splunk `dispatchState` value.
    pub fn from_splunk(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "DONE" => DispatchState::Done,
            "FAILED" => DispatchState::Failed,
            "QUEUED" | "PARSING" | "RUNNING" | "FINALIZING" | "PAUSED" => DispatchState::Running,
            _ => DispatchState::Unknown,
        }
    }

    /// Returns true for `Done` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, DispatchState::Done | DispatchState::Failed)
    }
}

/// A submitted search job.
#[derive(Debug, Clone)]
pub struct SearchJob {
    /// Search id assigned by Splunk.
    pub sid: String,
    state: DispatchState,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
}

impl SearchJob {
    /// Creates a job in the `Unknown` state.
    pub fn new(sid: String) -> Self {
        Self {
            sid,
            state: DispatchState::Unknown,
            created_at: Utc::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Records an observed state. Terminal states are final.
    pub fn observe(&mut self, state: DispatchState) {
        if !self.state.is_terminal() {
            self.state = state;
        }
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplunkSearch {
    /// Query text without the leading `search` command.
    pub query: String,
    /// Search window.
    pub range: TimeRange,
    /// Maximum number of results.
    pub count: u32,
}

/// Fields returned to callers from a Splunk result row.
fn result_sanitizer() -> RecordSanitizer {
    RecordSanitizer::keep(&[
        "id",
        "_time",
        "_indextime",
        "host",
        "source",
        "sourcetype",
        "index",
        "event_id",
        "EventCode",
        "signature",
        "severity",
        "category",
        "action",
        "app",
        "status",
        "src",
        "src_ip",
        "src_port",
        "dest",
        "dest_ip",
        "dest_port",
        "user",
        "message",
        "count",
    ])
}

/// Pulls the job id out of a submission response.
///
/// JSON `sid` first, then a structured XML parse. The literal `<sid>` scan is
/// only used when the body is not well-formed XML.
pub fn extract_sid(body: &str) -> ConnectorResult<String> {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        return json
            .get("sid")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::Parse("job response has no sid".into()));
    }

    match xml::element_text(body, "sid") {
        Ok(Some(sid)) => Ok(sid.trim().to_string()),
        Ok(None) => Err(ConnectorError::Parse("job response has no sid".into())),
        Err(e) => {
            debug!(error = %e, "Falling back to literal sid scan");
            xml::literal_tag_text(body, "sid")
                .ok_or_else(|| ConnectorError::Parse("job response has no sid".into()))
        }
    }
}

fn job_path(sid: &str) -> String {
    format!("{}/{}", JOBS_PATH, urlencoding::encode(sid))
}

/// Splunk search connector.
pub struct SplunkConnector {
    config: SplunkConfig,
    transport: Arc<dyn Transport>,
    credentials: CredentialManager,
    sanitizer: RecordSanitizer,
}

impl SplunkConnector {
    /// Creates a new Splunk connector over HTTP.
    pub fn new(config: SplunkConfig) -> ConnectorResult<Self> {
        let transport = Arc::new(HttpClient::new(&config.connector)?);
        Self::with_transport(config, transport)
    }

    /// Creates a connector over the given transport.
    pub fn with_transport(
        config: SplunkConfig,
        transport: Arc<dyn Transport>,
    ) -> ConnectorResult<Self> {
        if config.max_poll_attempts == 0 {
            return Err(ConnectorError::Config(
                "max_poll_attempts must be at least 1".to_string(),
            ));
        }

        let exchange: Arc<dyn LoginExchange> = if !config.token.is_empty() {
            Arc::new(StaticKey::new(config.token.clone()))
        } else if !config.username.is_empty() && !config.password.is_empty() {
            Arc::new(SplunkSessionLogin::new(
                transport.clone(),
                config.username.clone(),
                config.password.clone(),
                Duration::from_secs(config.session_ttl_secs),
            ))
        } else {
            return Err(ConnectorError::Config(
                "Splunk requires a token or a username and password".to_string(),
            ));
        };

        info!(
            base_url = %config.connector.base_url,
            poll_interval_ms = config.poll_interval_ms,
            max_poll_attempts = config.max_poll_attempts,
            "Splunk connector initialized"
        );

        Ok(Self {
            credentials: CredentialManager::new(exchange),
            sanitizer: result_sanitizer(),
            config,
            transport,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SplunkConfig {
        &self.config
    }

    /// Validates raw search parameters without any network call.
    pub fn validate_search(
        &self,
        query: &str,
        earliest_time: &str,
        latest_time: &str,
        count: i64,
    ) -> ConnectorResult<SplunkSearch> {
        let query = sanitize_text(query, &SPL_QUERY)?;
        Ok(SplunkSearch {
            query,
            range: TimeRange::lenient(earliest_time, latest_time),
            count: clamp_limit(count, self.config.max_results.min(MAX_SPLUNK_COUNT)),
        })
    }

    /// Runs a search end to end and returns sanitized result rows.
    #[instrument(skip(self))]
    pub async fn search_events(
        &self,
        query: &str,
        earliest_time: &str,
        latest_time: &str,
        count: i64,
    ) -> ConnectorResult<Vec<Value>> {
        let search = self.validate_search(query, earliest_time, latest_time, count)?;
        let auth = self.authorization().await?;

        let mut job = self.submit_job(&search, &auth).await?;
        self.poll_job(&mut job, &auth).await?;
        let raw = self.fetch_results(&job, search.count, &auth).await?;

        let results = self.sanitizer.sanitize(raw);
        info!(sid = %job.sid, results = results.len(), "Search completed");
        Ok(results)
    }

    async fn authorization(&self) -> ConnectorResult<SecureString> {
        let key = self.credentials.ensure_valid().await?;
        Ok(key.with_prefix("Splunk "))
    }

    /// Invalidates the session when Splunk rejects it.
    async fn reject_unauthorized(&self, response: &HttpResponse) -> ConnectorResult<()> {
        if response.is_unauthorized() {
            self.credentials.invalidate().await;
            return Err(ConnectorError::Authentication(
                "session rejected by Splunk".to_string(),
            ));
        }
        Ok(())
    }

    /// Submits a search job and returns it in the `Unknown` state.
    #[instrument(skip(self, auth))]
    pub async fn submit_job(
        &self,
        search: &SplunkSearch,
        auth: &SecureString,
    ) -> ConnectorResult<SearchJob> {
        let request = HttpRequest::post(JOBS_PATH)
            .authorization(auth.clone())
            .form([
                ("search", format!("search {}", search.query)),
                ("earliest_time", search.range.earliest.clone()),
                ("latest_time", search.range.latest.clone()),
                ("count", search.count.to_string()),
                ("output_mode", "json".to_string()),
            ]);

        let response = self.transport.send(request).await?;
        self.reject_unauthorized(&response).await?;
        if !response.is_success() {
            return Err(ConnectorError::Search(format!(
                "job submission returned status {}",
                response.status
            )));
        }

        let sid = extract_sid(&response.body)?;
        debug!(sid = %sid, "Search job created");
        Ok(SearchJob::new(sid))
    }

    /// Polls the job until it is done, failed or out of attempts.
    ///
    /// A non-2xx status or an unreadable body counts as an attempt and
    /// polling continues.
    #[instrument(skip(self, job, auth), fields(sid = %job.sid))]
    pub async fn poll_job(&self, job: &mut SearchJob, auth: &SecureString) -> ConnectorResult<()> {
        let path = job_path(&job.sid);
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let max_attempts = self.config.max_poll_attempts;

        for attempt in 1..=max_attempts {
            let request = HttpRequest::get(path.as_str()).authorization(auth.clone());
            let response = self.transport.send(request).await?;
            self.reject_unauthorized(&response).await?;

            let observed = if response.is_success() {
                match xml::atom_content_key(&response.body, "dispatchState") {
                    Ok(Some(state)) => DispatchState::from_splunk(&state),
                    Ok(None) => {
                        debug!(attempt, "Job status has no dispatchState");
                        DispatchState::Unknown
                    }
                    Err(e) => {
                        debug!(attempt, error = %e, "Unreadable job status");
                        DispatchState::Unknown
                    }
                }
            } else {
                warn!(attempt, status = response.status, "Job status request failed");
                DispatchState::Unknown
            };

            job.observe(observed);
            debug!(attempt, state = ?job.state(), "Polled search job");

            match job.state() {
                DispatchState::Done => return Ok(()),
                DispatchState::Failed => {
                    return Err(ConnectorError::Search(format!(
                        "search job {} failed",
                        job.sid
                    )));
                }
                DispatchState::Running | DispatchState::Unknown => {}
            }

            if attempt < max_attempts {
                sleep(interval).await;
            }
        }

        warn!(attempts = max_attempts, "Search job did not finish");
        Err(ConnectorError::SearchTimeout {
            sid: job.sid.clone(),
            attempts: max_attempts,
        })
    }

    /// Fetches the raw `results` of a finished job.
    #[instrument(skip(self, job, auth), fields(sid = %job.sid))]
    pub async fn fetch_results(
        &self,
        job: &SearchJob,
        count: u32,
        auth: &SecureString,
    ) -> ConnectorResult<Vec<Value>> {
        let request = HttpRequest::get(format!("{}/results", job_path(&job.sid)))
            .authorization(auth.clone())
            .query("output_mode", "json")
            .query("count", count.to_string());

        let response = self.transport.send(request).await?;
        self.reject_unauthorized(&response).await?;
        if !response.is_success() {
            return Err(ConnectorError::Search(format!(
                "results request returned status {}",
                response.status
            )));
        }

        let mut body: Value = response.json()?;
        match body.get_mut("results").map(Value::take) {
            Some(Value::Array(rows)) => Ok(rows),
            Some(_) => Err(ConnectorError::Parse("results is not a list".into())),
            None => {
                debug!("Results response has no results key");
                Ok(Vec::new())
            }
        }
    }
}

#[async_trait]
impl Connector for SplunkConnector {
    fn name(&self) -> &str {
        &self.config.connector.name
    }

    fn connector_type(&self) -> &str {
        "siem"
    }

    fn observe_secrets(&self, observer: SecretObserver) {
        self.credentials.observe_with(observer);
    }

    async fn shutdown(&self) {
        self.credentials.clear().await;
    }
}
