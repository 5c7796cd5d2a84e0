//! Configuration loading for the secbridge CLI.
//!
//! Each adapter reads its section of a YAML file, or its environment
//! variables when no file is given. Configuration is resolved once at
//! startup and never reloaded.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use sb_connectors::{CrowdStrikeConfig, MispConfig, SecureString, SplunkConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Backend served by one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Adapter {
    Splunk,
    Crowdstrike,
    Misp,
}

impl Adapter {
    pub fn name(self) -> &'static str {
        match self {
            Adapter::Splunk => "splunk",
            Adapter::Crowdstrike => "crowdstrike",
            Adapter::Misp => "misp",
        }
    }

    /// Port used by `serve` when `--port` is not given.
    pub fn default_port(self) -> u16 {
        match self {
            Adapter::Splunk => 8080,
            Adapter::Crowdstrike => 8081,
            Adapter::Misp => 8082,
        }
    }
}

impl fmt::Display for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub splunk: Option<SplunkConfig>,
    #[serde(default)]
    pub crowdstrike: Option<CrowdStrikeConfig>,
    #[serde(default)]
    pub misp: Option<MispConfig>,
    #[serde(default)]
    pub logging: LogSettings,
}

/// Logging section of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    /// Emit JSON log lines.
    #[serde(default)]
    pub json: bool,
}

impl AppConfig {
    /// Loads configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Extracts the section for one adapter.
    pub fn adapter(&self, adapter: Adapter) -> Result<AdapterConfig> {
        let config = match adapter {
            Adapter::Splunk => self.splunk.clone().map(AdapterConfig::Splunk),
            Adapter::Crowdstrike => self.crowdstrike.clone().map(AdapterConfig::CrowdStrike),
            Adapter::Misp => self.misp.clone().map(AdapterConfig::Misp),
        };
        let mut config = config
            .with_context(|| format!("Config file has no `{}` section", adapter))?;
        config.fill_name(adapter);
        Ok(config)
    }
}

/// Resolved configuration for the adapter being served.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AdapterConfig {
    Splunk(SplunkConfig),
    CrowdStrike(CrowdStrikeConfig),
    Misp(MispConfig),
}

fn env_flag(value: Option<String>, default: bool) -> bool {
    match value {
        Some(v) => v.trim().eq_ignore_ascii_case("true"),
        None => default,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AdapterConfig {
    /// Reads the adapter's configuration from the process environment.
    pub fn from_env(adapter: Adapter) -> Result<Self> {
        Self::from_lookup(adapter, |key| std::env::var(key).ok())
    }

    /// Reads the adapter's configuration through `var`.
    pub fn from_lookup<F>(adapter: Adapter, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = match adapter {
            Adapter::Splunk => {
                let host = non_empty(var("SPLUNK_HOST")).unwrap_or_else(|| "localhost".into());
                let port: u16 = match non_empty(var("SPLUNK_PORT")) {
                    Some(p) => p
                        .trim()
                        .parse()
                        .with_context(|| format!("SPLUNK_PORT is not a valid port: {}", p))?,
                    None => 8089,
                };

                let mut config = SplunkConfig::new(&format!("https://{}:{}", host, port));
                config.username = var("SPLUNK_USERNAME").unwrap_or_default();
                config.password = SecureString::new(var("SPLUNK_PASSWORD").unwrap_or_default());
                config.token = SecureString::new(var("SPLUNK_TOKEN").unwrap_or_default());
                config.connector.verify_tls = env_flag(var("SPLUNK_VERIFY_SSL"), true);
                AdapterConfig::Splunk(config)
            }
            Adapter::Crowdstrike => {
                let mut config = CrowdStrikeConfig::new(
                    &var("CROWDSTRIKE_CLIENT_ID").unwrap_or_default(),
                    &var("CROWDSTRIKE_CLIENT_SECRET").unwrap_or_default(),
                );
                if let Some(base_url) = non_empty(var("CROWDSTRIKE_BASE_URL")) {
                    config.connector.base_url = base_url;
                }
                if let Some(region) = non_empty(var("CROWDSTRIKE_REGION")) {
                    config.region = region;
                }
                config.member_cid = non_empty(var("CROWDSTRIKE_MEMBER_CID"));
                AdapterConfig::CrowdStrike(config)
            }
            Adapter::Misp => {
                let mut config = MispConfig::new(
                    &var("MISP_URL").unwrap_or_default(),
                    &var("MISP_KEY").unwrap_or_default(),
                );
                config.connector.verify_tls = env_flag(var("MISP_VERIFYCERT"), true);
                config.connector.proxy = non_empty(var("MISP_PROXY"));
                config.connector.ca_cert_path = non_empty(var("MISP_CERT"));
                if let Some(timeout) = non_empty(var("MISP_TIMEOUT")) {
                    config.connector.timeout_secs = timeout.trim().parse().with_context(|| {
                        format!("MISP_TIMEOUT is not a number of seconds: {}", timeout)
                    })?;
                }
                AdapterConfig::Misp(config)
            }
        };
        Ok(config)
    }

    fn fill_name(&mut self, adapter: Adapter) {
        let connector = match self {
            AdapterConfig::Splunk(c) => &mut c.connector,
            AdapterConfig::CrowdStrike(c) => &mut c.connector,
            AdapterConfig::Misp(c) => &mut c.connector,
        };
        if connector.name.is_empty() {
            connector.name = adapter.name().to_string();
        }
    }

    /// Checks that the credentials the adapter needs are present.
    pub fn validate(&self) -> Result<()> {
        match self {
            AdapterConfig::Splunk(c) => {
                let has_login = !c.username.is_empty() && !c.password.is_empty();
                if c.token.is_empty() && !has_login {
                    bail!("Splunk needs SPLUNK_TOKEN or SPLUNK_USERNAME and SPLUNK_PASSWORD");
                }
                if c.max_poll_attempts == 0 {
                    bail!("Splunk max_poll_attempts must be at least 1");
                }
            }
            AdapterConfig::CrowdStrike(c) => {
                if c.client_id.is_empty() || c.client_secret.is_empty() {
                    bail!("CrowdStrike needs CROWDSTRIKE_CLIENT_ID and CROWDSTRIKE_CLIENT_SECRET");
                }
            }
            AdapterConfig::Misp(c) => {
                if c.connector.base_url.trim().is_empty() {
                    bail!("MISP needs MISP_URL");
                }
                if c.api_key.is_empty() {
                    bail!("MISP needs MISP_KEY");
                }
            }
        }
        Ok(())
    }

    /// Secret values to scrub from logs.
    pub fn secrets(&self) -> Vec<String> {
        match self {
            AdapterConfig::Splunk(c) => c.secrets(),
            AdapterConfig::CrowdStrike(c) => c.secrets(),
            AdapterConfig::Misp(c) => c.secrets(),
        }
    }

    /// YAML rendering with every secret replaced by a marker.
    pub fn to_redacted_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to render configuration")
    }
}

/// Whether `SECBRIDGE_LOG_JSON` asks for JSON log output.
pub fn log_json_from_env() -> bool {
    std::env::var("SECBRIDGE_LOG_JSON")
        .is_ok_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
}
