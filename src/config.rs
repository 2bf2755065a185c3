use std::env::VarError;
use std::fmt;
use std::time::Duration;

use jiff::SignedDuration;
use rootcause::prelude::ResultExt;
use rootcause::{Report, bail, report};

use crate::provider::{DnsRecordType, ZoneId};

pub const ZONE_ID: &str = "ZONE_ID";
pub const RECORD_NAME: &str = "RECORD_NAME";
pub const NO_IP_HOSTNAME: &str = "NO_IP_HOSTNAME";
pub const CF_API_TOKEN: &str = "CF_API_TOKEN";

pub const REQUIRED_VARS: [&str; 4] = [ZONE_ID, RECORD_NAME, NO_IP_HOSTNAME, CF_API_TOKEN];

const DEFAULT_SCHEDULE_INTERVAL: &str = "5m";
const DEFAULT_RUN_TIMEOUT: &str = "15m";

/// Bearer token for the DNS provider. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken(<REDACTED>)")
    }
}

/// Everything one reconcile run needs to know.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub zone_id: ZoneId,
    pub record_name: String,
    pub probe_hostname: String,
    pub record_type: DnsRecordType,
    pub api_token: ApiToken,
}

impl ReconcileConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Absent values become empty strings and show up in
    /// [`ReconcileConfig::missing_fields`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).unwrap_or_default();
        Self {
            zone_id: ZoneId(get(ZONE_ID)),
            record_name: get(RECORD_NAME),
            probe_hostname: get(NO_IP_HOSTNAME),
            record_type: DnsRecordType::A,
            api_token: ApiToken::new(get(CF_API_TOKEN)),
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            (ZONE_ID, self.zone_id.0.as_str()),
            (RECORD_NAME, self.record_name.as_str()),
            (NO_IP_HOSTNAME, self.probe_hostname.as_str()),
            (CF_API_TOKEN, self.api_token.expose()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

pub fn ensure_env_vars(vars: &[&str]) -> Result<(), Report> {
    let mut error = report!("Missing required environment variable");
    let mut is_error = false;
    for var in vars {
        match std::env::var(var) {
            Ok(value) if !value.trim().is_empty() => continue,
            Ok(_) | Err(VarError::NotPresent) => {
                error = error.attach(format!("'{}' is not set", var));
                is_error = true;
            }
            Err(VarError::NotUnicode(e)) => {
                error = error.attach(format!("'{}' is not valid unicode: '{}'", var, e.display()));
                is_error = true;
            }
        }
    }
    if is_error { Err(error) } else { Ok(()) }
}

/// Reads `SCHEDULE_INTERVAL`, e.g. `5m`, `1h 30m` or `PT10M`.
pub fn schedule_interval() -> Result<Duration, Report> {
    duration_var("SCHEDULE_INTERVAL", DEFAULT_SCHEDULE_INTERVAL)
}

/// Reads `RUN_TIMEOUT`, the wall-clock limit of a single run.
pub fn run_timeout() -> Result<Duration, Report> {
    duration_var("RUN_TIMEOUT", DEFAULT_RUN_TIMEOUT)
}

fn duration_var(name: &str, default: &str) -> Result<Duration, Report> {
    let raw = std::env::var(name).unwrap_or(default.to_string());
    parse_duration(name, &raw)
}

pub fn parse_duration(name: &str, raw: &str) -> Result<Duration, Report> {
    let duration: SignedDuration = raw
        .trim()
        .parse()
        .context(format!("Invalid {name}"))
        .attach(format!("value: '{raw}'"))?;

    if !duration.is_positive() {
        bail!("{} must be positive, got '{}'", name, raw);
    }

    let duration = Duration::try_from(duration)
        .context(format!("{name} out of range"))
        .attach(format!("value: '{raw}'"))?;
    Ok(duration)
}
