//! # Storage Backends
//!
//! The contract between the loaders and a simulation database. A
//! [`Backend`] is a connection factory; every thread that talks to the
//! database opens its own [`Connection`] from it, connections are never
//! shared.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `SqliteBackend` | `sqlite` | Embedded single-file database |
//! | `RemoteBackend` | `remote` | MySQL server over TLS (`remote` feature) |
//! | `MemoryBackend` | `memory` | In-memory rows for testing/embedding |

pub mod rows;
pub mod memory;
pub mod sqlite;
#[cfg(feature = "remote")]
pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::Credentials;
use crate::model::{ChannelId, Role};
use crate::query::{ChannelFilter, NodeFilter};
use crate::{Error, Result};

pub use rows::{ChannelRow, InteractionRow, NodeRow, PathRow};
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
#[cfg(feature = "remote")]
pub use remote::RemoteBackend;

// ============================================================================
// Connection configuration
// ============================================================================

/// Where the simulation database lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionConfig {
    /// SQLite file on disk.
    Embedded { path: PathBuf },

    /// MySQL server; `database` is the schema to select.
    Remote {
        credentials: Credentials,
        database: String,
    },
}

impl ConnectionConfig {
    /// Without a credential file `target` is a database file; with one it is
    /// the schema name on the server named in the file.
    pub fn resolve(target: &str, credentials: Option<&Path>) -> Result<Self> {
        match credentials {
            None => Ok(ConnectionConfig::Embedded { path: PathBuf::from(target) }),
            Some(file) => Ok(ConnectionConfig::Remote {
                credentials: Credentials::from_file(file)?,
                database: target.to_string(),
            }),
        }
    }
}

// ============================================================================
// Session options: timeout + cancellation
// ============================================================================

/// Cooperative cancellation flag shared between a load and its workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag so the owner can run another load.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

/// Per-connection settings handed to [`Backend::connect`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub query_timeout: Option<Duration>,
    pub cancel: CancelToken,
}

// ============================================================================
// Backend + Connection traits
// ============================================================================

/// One live database session. Blocking, not shareable across threads.
pub trait Connection: Send {
    /// Node rows of one role, ascending id.
    fn fetch_nodes(&mut self, role: Role, filter: &NodeFilter) -> Result<Vec<NodeRow>>;

    /// Channel summaries, ordered by (tx, rx).
    fn fetch_channels(&mut self, filter: &ChannelFilter) -> Result<Vec<ChannelRow>>;

    /// Path rows of a channel by descending received power, at most `limit`.
    fn fetch_paths(&mut self, channel: ChannelId, limit: Option<usize>) -> Result<Vec<PathRow>>;

    /// Interaction rows of a channel in database order.
    fn fetch_interactions(&mut self, channel: ChannelId) -> Result<Vec<InteractionRow>>;

    /// `(code, description)` pairs from `interaction_type`.
    fn fetch_interaction_types(&mut self) -> Result<Vec<(i64, String)>>;

    /// Close the session.
    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// Connection factory for one database.
pub trait Backend: Send + Sync + 'static {
    type Conn: Connection;

    /// Open a new session.
    fn connect(&self, session: &SessionOptions) -> Result<Self::Conn>;

    /// Remote backends are threaded by default.
    fn is_remote(&self) -> bool {
        false
    }

    /// Short human description for logs.
    fn describe(&self) -> String;
}

/// Close a connection if one was opened; `None` is a no-op.
pub fn release<C: Connection>(conn: Option<C>) -> Result<()> {
    match conn {
        Some(c) => c.close(),
        None => Ok(()),
    }
}

// ============================================================================
// AnyBackend: runtime-selected backend
// ============================================================================

/// Backend chosen from a [`ConnectionConfig`] at runtime.
#[derive(Debug, Clone)]
pub enum AnyBackend {
    Sqlite(SqliteBackend),
    #[cfg(feature = "remote")]
    Remote(RemoteBackend),
}

impl AnyBackend {
    pub fn from_config(config: ConnectionConfig) -> Result<Self> {
        match config {
            ConnectionConfig::Embedded { path } => Ok(AnyBackend::Sqlite(SqliteBackend::new(path))),
            #[cfg(feature = "remote")]
            ConnectionConfig::Remote { credentials, database } => {
                Ok(AnyBackend::Remote(RemoteBackend::new(credentials, database)))
            }
            #[cfg(not(feature = "remote"))]
            ConnectionConfig::Remote { credentials, .. } => Err(Error::ConnectionFailure(format!(
                "cannot reach {}: built without the `remote` feature",
                credentials.host
            ))),
        }
    }
}

pub enum AnyConnection {
    Sqlite(sqlite::SqliteConnection),
    #[cfg(feature = "remote")]
    Remote(remote::RemoteConnection),
}

macro_rules! dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            AnyConnection::Sqlite($c) => $body,
            #[cfg(feature = "remote")]
            AnyConnection::Remote($c) => $body,
        }
    };
}

impl Connection for AnyConnection {
    fn fetch_nodes(&mut self, role: Role, filter: &NodeFilter) -> Result<Vec<NodeRow>> {
        dispatch!(self, c => c.fetch_nodes(role, filter))
    }

    fn fetch_channels(&mut self, filter: &ChannelFilter) -> Result<Vec<ChannelRow>> {
        dispatch!(self, c => c.fetch_channels(filter))
    }

    fn fetch_paths(&mut self, channel: ChannelId, limit: Option<usize>) -> Result<Vec<PathRow>> {
        dispatch!(self, c => c.fetch_paths(channel, limit))
    }

    fn fetch_interactions(&mut self, channel: ChannelId) -> Result<Vec<InteractionRow>> {
        dispatch!(self, c => c.fetch_interactions(channel))
    }

    fn fetch_interaction_types(&mut self) -> Result<Vec<(i64, String)>> {
        dispatch!(self, c => c.fetch_interaction_types())
    }

    fn close(self) -> Result<()> {
        dispatch!(self, c => c.close())
    }
}

impl Backend for AnyBackend {
    type Conn = AnyConnection;

    fn connect(&self, session: &SessionOptions) -> Result<AnyConnection> {
        match self {
            AnyBackend::Sqlite(b) => b.connect(session).map(AnyConnection::Sqlite),
            #[cfg(feature = "remote")]
            AnyBackend::Remote(b) => b.connect(session).map(AnyConnection::Remote),
        }
    }

    fn is_remote(&self) -> bool {
        match self {
            AnyBackend::Sqlite(b) => b.is_remote(),
            #[cfg(feature = "remote")]
            AnyBackend::Remote(b) => b.is_remote(),
        }
    }

    fn describe(&self) -> String {
        match self {
            AnyBackend::Sqlite(b) => b.describe(),
            #[cfg(feature = "remote")]
            AnyBackend::Remote(b) => b.describe(),
        }
    }
}

/// Resolve `target`/`credentials` into a backend.
pub fn open(target: &str, credentials: Option<&Path>) -> Result<AnyBackend> {
    AnyBackend::from_config(ConnectionConfig::resolve(target, credentials)?)
}

/// Open one live connection: the embedded file at `target`, or schema
/// `target` on the server named in the credential file.
pub fn connect(target: &str, credentials: Option<&Path>) -> Result<AnyConnection> {
    open(target, credentials)?.connect(&SessionOptions::default())
}
