//! Loader configuration and the credential file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use crate::{Error, Result};

/// Default cap on retained paths per channel.
pub const DEFAULT_NPATHS: usize = 250;

// ============================================================================
// Credentials
// ============================================================================

/// Remote server credentials: host, user and password.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Read the three-line credential file: host, user, password.
    ///
    /// Lines are taken verbatim apart from the line terminator. Anything past
    /// the third line is ignored.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read credential file {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let mut next = |what: &str| {
            lines
                .next()
                .map(str::to_string)
                .ok_or_else(|| Error::Config(format!("credential file is missing the {what} line")))
        };
        let host = next("host")?;
        let user = next("user")?;
        let password = next("password")?;
        if host.is_empty() {
            return Err(Error::Config("credential file has an empty host line".into()));
        }
        Ok(Self { host, user, password })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Loader configuration
// ============================================================================

/// What to do when one shard of a threaded load fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardFailurePolicy {
    /// Fail the whole load; nothing from any shard is merged.
    #[default]
    Abort,
    /// Re-run a failed shard on a fresh connection, then abort.
    Retry { attempts: u32 },
    /// Log the failure and keep the shards that succeeded.
    Continue,
}

/// Settings for [`DataStorage`](crate::DataStorage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Strongest paths kept per channel.
    pub npaths: usize,
    /// Force the threaded (`Some(true)`) or sequential (`Some(false)`) loader.
    /// `None` threads remote backends only.
    pub threaded: Option<bool>,
    /// Worker pool size; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub shard_failure: ShardFailurePolicy,
    /// Upper bound on a single query round trip.
    #[serde(with = "duration_millis")]
    pub query_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            npaths: DEFAULT_NPATHS,
            threaded: None,
            workers: None,
            shard_failure: ShardFailurePolicy::Abort,
            query_timeout: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_npaths(mut self, npaths: usize) -> Self {
        self.npaths = npaths;
        self
    }

    pub fn threaded(mut self, threaded: bool) -> Self {
        self.threaded = Some(threaded);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_shard_failure(mut self, policy: ShardFailurePolicy) -> Self {
        self.shard_failure = policy;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    /// Worker count actually used, never zero.
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1)
    }

    /// Whether loads should be sharded, given the backend's preference.
    pub fn use_threads(&self, backend_is_remote: bool) -> bool {
        self.threaded.unwrap_or(backend_is_remote)
    }
}

mod duration_millis {
    use std::time::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credentials() {
        let c = Credentials::parse("db.example.org\nanalyst\ns3cr et\n").unwrap();
        assert_eq!(c.host, "db.example.org");
        assert_eq!(c.user, "analyst");
        assert_eq!(c.password, "s3cr et");
    }

    #[test]
    fn test_parse_credentials_crlf_and_missing_newline() {
        let c = Credentials::parse("h\r\nu\r\np").unwrap();
        assert_eq!((c.host.as_str(), c.user.as_str(), c.password.as_str()), ("h", "u", "p"));
    }

    #[test]
    fn test_parse_credentials_too_short() {
        assert!(matches!(Credentials::parse("host\nuser"), Err(Error::Config(_))));
        assert!(matches!(Credentials::parse(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let c = Credentials::parse("h\nu\nhunter2\n").unwrap();
        assert!(!format!("{c:?}").contains("hunter2"));
    }

    #[test]
    fn test_loader_config_json() {
        let cfg: LoaderConfig = serde_json::from_str(
            r#"{"npaths": 10, "shard_failure": {"retry": {"attempts": 2}}, "query_timeout": 1500}"#,
        )
        .unwrap();
        assert_eq!(cfg.npaths, 10);
        assert_eq!(cfg.shard_failure, ShardFailurePolicy::Retry { attempts: 2 });
        assert_eq!(cfg.query_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(cfg.threaded, None);
    }

    #[test]
    fn test_thread_selection() {
        let cfg = LoaderConfig::default();
        assert!(cfg.use_threads(true));
        assert!(!cfg.use_threads(false));
        assert!(cfg.clone().threaded(true).use_threads(false));
        assert_eq!(cfg.with_workers(0).effective_workers(), 1);
    }
}
