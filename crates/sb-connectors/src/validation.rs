//! Input validation for caller-supplied search parameters.
//!
//! Every connector runs its parameters through these functions before it
//! touches the credential manager or the transport, so rejected input never
//! produces network traffic.

use crate::traits::{ConnectorError, ConnectorResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on results for CrowdStrike and MISP searches.
pub const MAX_LIMIT: u32 = 1000;

/// Upper bound on results for Splunk searches.
pub const MAX_SPLUNK_COUNT: u32 = 10_000;

/// Default earliest time when the caller's token is not recognized.
pub const DEFAULT_EARLIEST: &str = "-24h";

/// Default latest time when the caller's token is not recognized.
pub const DEFAULT_LATEST: &str = "now";

/// Sort keys accepted by the detection search.
pub const DETECTION_SORT_KEYS: &[&str] = &[
    "created_timestamp.asc",
    "created_timestamp.desc",
    "last_behavior.asc",
    "last_behavior.desc",
    "first_behavior.asc",
    "first_behavior.desc",
    "max_severity.asc",
    "max_severity.desc",
    "max_confidence.asc",
    "max_confidence.desc",
    "status.asc",
    "status.desc",
];

static CONTROL_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x1f\x7f-\u{9f}]").expect("Invalid control char pattern"));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid validation pattern"))
        .collect()
}

/// Rules applied to one free-text field.
#[derive(Debug)]
pub struct TextPolicy {
    /// Field name used in error messages.
    pub field: &'static str,
    /// Maximum length of the raw input in characters.
    pub max_len: usize,
    /// Whether an empty value is rejected.
    pub required: bool,
    /// Patterns that must not match anywhere in the value.
    pub deny: Vec<Regex>,
    /// Pattern the whole value must match, if any.
    pub allow: Option<Regex>,
}

/// Splunk SPL search text.
pub static SPL_QUERY: Lazy<TextPolicy> = Lazy::new(|| TextPolicy {
    field: "query",
    max_len: 10_000,
    required: true,
    deny: compile(&[
        r"(?i)\|\s*(delete|outputcsv|outputlookup|script|sendemail|run|collect|dbxquery)\b",
    ]),
    allow: None,
});

/// CrowdStrike FQL filter.
pub static FQL_FILTER: Lazy<TextPolicy> = Lazy::new(|| TextPolicy {
    field: "filter_query",
    max_len: 1000,
    required: false,
    deny: compile(&[
        r"(?i)\bunion\b[\s\S]*\bselect\b",
        r"(?i)\bselect\b[\s\S]*\bfrom\b",
        r"(?i)\b(drop|alter|truncate)\s+table\b",
        r"(?i)\bdelete\s+from\b",
        r"(?i)\binsert\s+into\b",
        r"(?i)\bexec(ute)?\s*\(",
        r"(?i)<\s*/?\s*script",
        r"--",
        r"/\*",
        r"\*/",
        r"(?i)'\s*or\s*'[^']*'\s*=\s*'",
        r"(?i)\bor\s+\d+\s*=\s*\d+",
        r"(?i)\band\s+\d+\s*=\s*\d+",
    ]),
    allow: Some(
        Regex::new(r#"^[A-Za-z0-9_.:'"*+\-,\[\]<>=!()@/ ]*$"#).expect("Invalid FQL allow pattern"),
    ),
});

/// MISP free-text fields (`query`, `value`).
pub static MISP_TEXT: Lazy<TextPolicy> = Lazy::new(|| TextPolicy {
    field: "value",
    max_len: 1000,
    required: false,
    deny: compile(&[
        r"(?is)<script[^>]*>.*?</script>",
        r"(?i)javascript:",
        r"(?i)vbscript:",
        r"(?i)on\w+\s*=",
        r"(?i)union\s+select",
        r"(?i)drop\s+table",
        r"(?i)delete\s+from",
        r"(?i)insert\s+into",
    ]),
    allow: None,
});

/// MISP enumerated fields (`type`, `category`, event type).
pub static MISP_KEYWORD: Lazy<TextPolicy> = Lazy::new(|| TextPolicy {
    field: "type",
    max_len: 100,
    required: false,
    deny: Vec::new(),
    allow: Some(Regex::new(r"^[A-Za-z0-9 _.|\-]*$").expect("Invalid MISP keyword pattern")),
});

/// Validates and normalizes one free-text value.
///
/// Order: raw length cap, control-character strip, denylist, allow-list,
/// trim. Error messages name the field and never include the input.
pub fn sanitize_text(input: &str, policy: &TextPolicy) -> ConnectorResult<String> {
    sanitize_field(input, policy, policy.field)
}

/// Like [`sanitize_text`] but reports errors under `field`.
pub fn sanitize_field(input: &str, policy: &TextPolicy, field: &str) -> ConnectorResult<String> {
    if input.chars().count() > policy.max_len {
        return Err(ConnectorError::Validation(format!(
            "{} exceeds {} characters",
            field, policy.max_len
        )));
    }

    let stripped = CONTROL_CHARS.replace_all(input, "");

    if policy.deny.iter().any(|re| re.is_match(&stripped)) {
        return Err(ConnectorError::Validation(format!(
            "{} contains a disallowed pattern",
            field
        )));
    }

    if let Some(allow) = &policy.allow {
        if !allow.is_match(&stripped) {
            return Err(ConnectorError::Validation(format!(
                "{} contains disallowed characters",
                field
            )));
        }
    }

    let trimmed = stripped.trim();
    if policy.required && trimmed.is_empty() {
        return Err(ConnectorError::Validation(format!("{} is required", field)));
    }

    Ok(trimmed.to_string())
}

/// Clamps a requested result count into `[1, max]`.
pub fn clamp_limit(requested: i64, max: u32) -> u32 {
    requested.clamp(1, i64::from(max)) as u32
}

/// Checks a sort key against a fixed set.
pub fn validate_sort(key: &str, allowed: &[&str]) -> ConnectorResult<String> {
    let key = key.trim();
    if allowed.contains(&key) {
        Ok(key.to_string())
    } else {
        Err(ConnectorError::Validation(
            "sort must be one of the supported sort keys".to_string(),
        ))
    }
}

static TIME_TOKEN_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"^-?\d+[smhdwMy]$",
        r"^now$",
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$",
        r"^\d{10}$",
        r"^@[dwyMm]$",
    ])
});

/// Returns true if `token` is a recognized Splunk time modifier.
pub fn is_valid_time_token(token: &str) -> bool {
    TIME_TOKEN_PATTERNS.iter().any(|re| re.is_match(token))
}

/// A validated search window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRange {
    /// Earliest time token.
    pub earliest: String,
    /// Latest time token.
    pub latest: String,
}

impl TimeRange {
    /// Builds a range, replacing unrecognized tokens with `-24h` / `now`
    /// instead of failing.
    pub fn lenient(earliest: &str, latest: &str) -> Self {
        let pick = |token: &str, default: &str| {
            let token = token.trim();
            if is_valid_time_token(token) {
                token.to_string()
            } else {
                default.to_string()
            }
        };
        Self {
            earliest: pick(earliest, DEFAULT_EARLIEST),
            latest: pick(latest, DEFAULT_LATEST),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self {
            earliest: DEFAULT_EARLIEST.to_string(),
            latest: DEFAULT_LATEST.to_string(),
        }
    }
}
