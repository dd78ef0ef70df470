//! # propdata — Ray-Tracing Propagation Data Loader
//!
//! Loads the SQL output of a radio-propagation ray tracer into an
//! in-memory graph of transmitters, receivers, channels, paths and
//! interactions.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: [`Backend`] / [`Connection`] are the contract between loaders and databases
//! 2. **Clean DTOs**: `Node`, `Channel`, `Path`, `Interaction` cross all boundaries
//! 3. **One owner**: the [`Graph`] owns every channel; both endpoints refer to it by id
//! 4. **Local then merge**: worker threads never mutate the shared graph
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use propdata::{DataStorage, LoaderConfig, NodeId};
//!
//! # fn example() -> propdata::Result<()> {
//! let mut storage = DataStorage::open("scene.sqlite", None, LoaderConfig::default())?;
//! storage.load_all()?;
//!
//! let tx = storage.tx(NodeId(1)).expect("TX 1");
//! for (rx, channel) in tx.chans_to_pairs() {
//!     println!("{rx}: {} paths, {} mW", channel.paths.len(), channel.power);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | SQLite | (default) | Embedded single-file database |
//! | Remote | `remote` | MySQL server, credentials from a three-line file |
//! | Memory | (default) | In-memory rows for testing/embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod query;
pub mod storage;
pub mod loader;
pub mod lazy;
pub mod export;

use std::path::Path as FsPath;
use std::time::Duration;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Channel, ChannelId, Graph, Interaction, InteractionKind, InteractionSlot,
    InteractionTypes, Interactions, Node, NodeId, NodeRef, Path, PathId, Point3,
    Registered, Role, SetId,
};

// ============================================================================
// Re-exports: Storage & configuration
// ============================================================================

pub use config::{Credentials, LoaderConfig, ShardFailurePolicy, DEFAULT_NPATHS};
pub use query::{IdRange, NodeFilter};
pub use storage::{
    AnyBackend, Backend, CancelToken, Connection, ConnectionConfig, MemoryBackend,
    SessionOptions, SqliteBackend,
};

// ============================================================================
// Re-exports: Loading
// ============================================================================

pub use loader::{LoadMode, LoadReport, Phase};
pub use lazy::LazyStorage;

// ============================================================================
// Top-level DataStorage handle
// ============================================================================

/// The primary entry point. A `DataStorage` wraps a backend and the graph
/// loaded from it.
///
/// Loads run in phase order: [`load_rxtx`](Self::load_rxtx), then
/// [`load_paths`](Self::load_paths), then
/// [`load_interactions`](Self::load_interactions). Each phase may be
/// repeated; calling one before its predecessor is an
/// [`Error::OrderingViolation`].
pub struct DataStorage<B: Backend> {
    backend: B,
    config: LoaderConfig,
    session: SessionOptions,
    graph: Graph,
    phase: Phase,
    interaction_types: InteractionTypes,
}

impl DataStorage<AnyBackend> {
    /// Embedded file at `target`, or schema `target` on the server named in
    /// the `credentials` file.
    pub fn open(target: &str, credentials: Option<&FsPath>, config: LoaderConfig) -> Result<Self> {
        Ok(Self::with_backend(storage::open(target, credentials)?, config))
    }
}

impl<B: Backend> DataStorage<B> {
    /// Wrap a backend. No connection is opened until the first load.
    pub fn with_backend(backend: B, config: LoaderConfig) -> Self {
        let session = SessionOptions { query_timeout: config.query_timeout, cancel: CancelToken::new() };
        Self {
            backend,
            config,
            session,
            graph: Graph::new(),
            phase: Phase::Empty,
            interaction_types: InteractionTypes::new(),
        }
    }

    fn loader(&self) -> loader::Loader<'_, B> {
        loader::Loader { backend: &self.backend, session: &self.session, config: &self.config }
    }

    fn require(&self, operation: &'static str, required: Phase) -> Result<()> {
        if self.phase < required {
            return Err(Error::OrderingViolation { operation, required: required.operation() });
        }
        Ok(())
    }

    /// Load every TX and RX.
    pub fn load_rxtx(&mut self) -> Result<LoadReport> {
        let mut graph = std::mem::take(&mut self.graph);
        let report = self.loader().load_nodes(&mut graph);
        self.graph = graph;
        let report = report?;
        self.phase = self.phase.max(Phase::Nodes);
        Ok(report)
    }

    /// Load channels and their `npaths` strongest paths.
    ///
    /// A reload trims or extends each channel to the new top-`npaths` and
    /// moves the phase back to [`Phase::Paths`]: paths it adds have no
    /// interactions until [`load_interactions`](Self::load_interactions)
    /// runs again.
    pub fn load_paths(&mut self, npaths: usize) -> Result<LoadReport> {
        self.require("load_paths", Phase::Nodes)?;
        let mut config = self.config.clone();
        config.npaths = npaths;
        let mut graph = std::mem::take(&mut self.graph);
        let report = loader::Loader { backend: &self.backend, session: &self.session, config: &config }
            .load_paths(&mut graph);
        self.graph = graph;
        let report = report?;
        self.config = config;
        self.phase = Phase::Paths;
        Ok(report)
    }

    /// Load interactions and compute path lengths. With `store = false`
    /// paths keep only their interaction counts.
    pub fn load_interactions(&mut self, store: bool) -> Result<LoadReport> {
        self.require("load_interactions", Phase::Paths)?;
        let mut graph = std::mem::take(&mut self.graph);
        let report = self.loader().load_interactions(&mut graph, store);
        self.graph = graph;
        let report = report?;
        self.phase = Phase::Interactions;
        Ok(report)
    }

    /// All three phases with [`DEFAULT_NPATHS`] paths and stored interactions.
    pub fn load_all(&mut self) -> Result<Vec<LoadReport>> {
        Ok(vec![
            self.load_rxtx()?,
            self.load_paths(DEFAULT_NPATHS)?,
            self.load_interactions(true)?,
        ])
    }

    /// Load the interaction code → description table.
    pub fn load_interaction_types(&mut self) -> Result<&InteractionTypes> {
        let mut conn = self.backend.connect(&self.session)?;
        let rows = conn.fetch_interaction_types();
        storage::release(Some(conn))?;
        self.interaction_types = rows?.into_iter().collect();
        tracing::info!(types = self.interaction_types.len(), "interaction types loaded");
        Ok(&self.interaction_types)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable graph access, e.g. to flag near-field failures.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn txs(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.graph.txs().keys().filter_map(|id| self.graph.tx(*id))
    }

    pub fn rxs(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.graph.rxs().keys().filter_map(|id| self.graph.rx(*id))
    }

    pub fn tx(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.graph.tx(id)
    }

    pub fn rx(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.graph.rx(id)
    }

    /// Token that cancels the running load when triggered from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.session.cancel.clone()
    }

    pub fn interaction_types(&self) -> &InteractionTypes {
        &self.interaction_types
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Query-on-access views over a fresh connection to the same database.
    pub fn lazy(&self) -> Result<LazyStorage<B>>
    where
        B: Clone,
    {
        LazyStorage::connect(self.backend.clone(), &self.session)
    }
}

impl<B: Backend> std::fmt::Display for DataStorage<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.backend.describe())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} called before {required}")]
    OrderingViolation { operation: &'static str, required: &'static str },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Load cancelled")]
    Cancelled,

    #[error("Shard {axis} {range} failed: {source}")]
    ShardFailure {
        axis: Role,
        range: IdRange,
        source: Box<Error>,
    },

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Worker pool error: {0}")]
    Pool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
