//! # Eager loaders
//!
//! Three phases fill a [`Graph`] from a simulation database:
//!
//! 1. **Nodes**: every TX and RX row.
//! 2. **Paths**: channel summaries plus the strongest `npaths` paths of
//!    each channel.
//! 3. **Interactions**: interaction points of every retained path, and the
//!    geometric path length derived from them.
//!
//! Phases 2 and 3 run either sequentially on the caller's thread over one
//! connection, or sharded over a worker pool (see [`shard`]). Both modes
//! compute owned results first and commit them to the graph only once the
//! phase has succeeded, so a failed phase leaves the graph as it was.

pub mod assemble;
pub mod shard;

use std::time::{Duration, Instant};

use crate::config::LoaderConfig;
use crate::model::{Channel, Graph, Role};
use crate::query::{IdRange, NodeFilter};
use crate::storage::{self, Backend, Connection, SessionOptions};
use crate::Result;

pub use assemble::{PathInteractions, thread_interactions};
pub use shard::{ShardError, ShardOutcome, ShardRunner, choose_axis, partition};

/// Load phases in the order they must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Empty,
    Nodes,
    Paths,
    Interactions,
}

impl Phase {
    /// Name of the `DataStorage` call that completes this phase.
    pub fn operation(self) -> &'static str {
        match self {
            Phase::Empty => "new",
            Phase::Nodes => "load_rxtx",
            Phase::Paths => "load_paths",
            Phase::Interactions => "load_interactions",
        }
    }
}

/// How a phase was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Sequential,
    Threaded { axis: Role, workers: usize },
}

/// Summary of one completed load phase.
#[derive(Debug)]
pub struct LoadReport {
    pub phase: Phase,
    pub mode: LoadMode,
    /// Nodes inserted (phase 1 only).
    pub nodes: usize,
    /// Channels newly registered.
    pub channels: usize,
    /// Paths newly inserted.
    pub paths: usize,
    /// Interaction slots now attached to paths.
    pub interactions: usize,
    /// Shards run; 1 for sequential loads.
    pub shards: usize,
    /// Shards skipped under [`ShardFailurePolicy::Continue`](crate::ShardFailurePolicy::Continue).
    pub failed_shards: Vec<ShardError>,
    pub elapsed: Duration,
}

impl LoadReport {
    fn new(phase: Phase, mode: LoadMode) -> Self {
        Self {
            phase,
            mode,
            nodes: 0,
            channels: 0,
            paths: 0,
            interactions: 0,
            shards: 1,
            failed_shards: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed_shards.is_empty()
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Runs load phases against one backend.
pub struct Loader<'a, B: Backend> {
    pub backend: &'a B,
    pub session: &'a SessionOptions,
    pub config: &'a LoaderConfig,
}

impl<'a, B: Backend> Loader<'a, B> {
    fn mode(&self, graph: &Graph) -> LoadMode {
        if self.config.use_threads(self.backend.is_remote()) {
            LoadMode::Threaded { axis: choose_axis(graph), workers: self.config.effective_workers() }
        } else {
            LoadMode::Sequential
        }
    }

    fn runner(&self, axis: Role, workers: usize) -> ShardRunner<'_, B> {
        ShardRunner {
            backend: self.backend,
            session: self.session,
            axis,
            workers,
            policy: self.config.shard_failure,
        }
    }

    /// Run `f` over one connection opened for the duration of the call.
    fn with_connection<T>(&self, f: impl FnOnce(&mut B::Conn) -> Result<T>) -> Result<T> {
        let mut conn = self.backend.connect(self.session)?;
        let out = f(&mut conn);
        let closed = storage::release(Some(conn));
        let out = out?;
        closed?;
        Ok(out)
    }

    /// Phase 1: every TX and RX. Nodes already present are kept.
    pub fn load_nodes(&self, graph: &mut Graph) -> Result<LoadReport> {
        let started = Instant::now();
        tracing::info!(backend = %self.backend.describe(), "loading nodes");

        let (txs, rxs) = self.with_connection(|conn| {
            let txs = conn.fetch_nodes(Role::Tx, &NodeFilter::all())?;
            self.session.cancel.check()?;
            let rxs = conn.fetch_nodes(Role::Rx, &NodeFilter::all())?;
            Ok((txs, rxs))
        })?;

        let mut report = LoadReport::new(Phase::Nodes, LoadMode::Sequential);
        for row in txs {
            report.nodes += usize::from(graph.insert_node(row.into_node(Role::Tx)));
        }
        for row in rxs {
            report.nodes += usize::from(graph.insert_node(row.into_node(Role::Rx)));
        }
        report.elapsed = started.elapsed();
        tracing::info!(
            txs = graph.txs().len(),
            rxs = graph.rxs().len(),
            inserted = report.nodes,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "nodes loaded"
        );
        Ok(report)
    }

    /// Phase 2: channels and their top-`npaths` paths. On a reload each
    /// fetched channel's path set becomes the fresh top-`npaths`.
    pub fn load_paths(&self, graph: &mut Graph) -> Result<LoadReport> {
        let started = Instant::now();
        let npaths = self.config.npaths;
        let mode = self.mode(graph);
        tracing::info!(npaths, mode = ?mode, "loading channels and paths");

        let mut report = LoadReport::new(Phase::Paths, mode);
        let shared: &Graph = graph;
        let channels: Vec<Channel> = match mode {
            LoadMode::Sequential => self.with_connection(|conn| {
                assemble::fetch_channels(conn, shared, Role::Tx, IdRange::all(), npaths, true, &self.session.cancel)
            })?,
            LoadMode::Threaded { axis, workers } => {
                let ranges = shard::plan(shared, axis, workers);
                report.shards = ranges.len();
                let outcome = self.runner(axis, workers).run(&ranges, |conn, range| {
                    assemble::fetch_channels(conn, shared, axis, range, npaths, false, &self.session.cancel)
                })?;
                report.failed_shards = outcome.failed;
                outcome.outputs.into_iter().flat_map(|(_, out)| out).collect()
            }
        };

        let registered = graph.register_channels(channels)?;
        report.channels = registered.channels;
        report.paths = registered.paths;
        report.elapsed = started.elapsed();
        tracing::info!(
            channels = report.channels,
            paths = report.paths,
            shards = report.shards,
            failed = report.failed_shards.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "channels and paths loaded"
        );
        Ok(report)
    }

    /// Phase 3: interactions and path lengths. `store = false` keeps only
    /// the per-path interaction count.
    pub fn load_interactions(&self, graph: &mut Graph, store: bool) -> Result<LoadReport> {
        let started = Instant::now();
        let mode = self.mode(graph);
        tracing::info!(store, mode = ?mode, "loading interactions");

        let mut report = LoadReport::new(Phase::Interactions, mode);
        let shared: &Graph = graph;
        let updates: Vec<PathInteractions> = match mode {
            LoadMode::Sequential => self.with_connection(|conn| {
                assemble::fetch_interactions(conn, shared, Role::Tx, IdRange::all(), store, &self.session.cancel)
            })?,
            LoadMode::Threaded { axis, workers } => {
                let ranges = shard::plan(shared, axis, workers);
                report.shards = ranges.len();
                let outcome = self.runner(axis, workers).run(&ranges, |conn, range| {
                    assemble::fetch_interactions(conn, shared, axis, range, store, &self.session.cancel)
                })?;
                report.failed_shards = outcome.failed;
                outcome.outputs.into_iter().flat_map(|(_, out)| out).collect()
            }
        };

        for update in updates {
            report.interactions += update.interactions.len();
            graph.set_interactions(update.channel, update.path, update.interactions, update.length);
        }
        report.elapsed = started.elapsed();
        tracing::info!(
            interactions = report.interactions,
            shards = report.shards,
            failed = report.failed_shards.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "interactions loaded"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardFailurePolicy;
    use crate::model::*;
    use crate::storage::MemoryBackend;

    fn backend() -> MemoryBackend {
        let b = MemoryBackend::new();
        b.add_tx(1, [0.0, 0.0, 0.0], 1)
            .add_rx(10, [3.0, 4.0, 0.0], 1)
            .add_rx(11, [0.0, 0.0, 2.0], 1)
            .add_channel(100, 1, 10, 1e-5, 1e-8, 1e-9)
            .add_channel(101, 1, 11, 1e-6, 1e-8, 1e-9)
            .add_path(100, 1000, 6e-6, 1e-8)
            .add_path(100, 1001, 4e-6, 2e-8)
            .add_path(101, 1010, 1e-6, 1e-8)
            .add_interaction(1001, [3.0, 0.0, 0.0], 1);
        b
    }

    fn load(config: &LoaderConfig, b: &MemoryBackend) -> Graph {
        let session = SessionOptions::default();
        let loader = Loader { backend: b, session: &session, config };
        let mut g = Graph::new();
        loader.load_nodes(&mut g).unwrap();
        loader.load_paths(&mut g).unwrap();
        loader.load_interactions(&mut g, true).unwrap();
        g
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Empty < Phase::Nodes);
        assert!(Phase::Nodes < Phase::Paths);
        assert!(Phase::Paths < Phase::Interactions);
        assert_eq!(Phase::Paths.operation(), "load_paths");
    }

    #[test]
    fn test_sequential_and_threaded_agree() {
        let b = backend();
        let seq = load(&LoaderConfig::default().threaded(false), &b);
        let par = load(&LoaderConfig::default().threaded(true).with_workers(3), &b);
        assert_eq!(seq, par);
        assert_eq!(seq.channel_count(), 2);
        assert_eq!(seq.path_count(), 3);
    }

    #[test]
    fn test_nlos_length_goes_through_interaction() {
        let g = load(&LoaderConfig::default(), &backend());
        let p = g.path(ChannelId(100), PathId(1001)).unwrap();
        // (0,0,0) → (3,0,0) → (3,4,0)
        assert!((p.length - 7.0).abs() < 1e-12);
        let los = g.path(ChannelId(100), PathId(1000)).unwrap();
        assert!((los.length - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_failed_phase_leaves_graph_untouched() {
        let b = backend();
        b.fail_path_query_on(101);
        let config = LoaderConfig::default().threaded(false);
        let session = SessionOptions::default();
        let loader = Loader { backend: &b, session: &session, config: &config };

        let mut g = Graph::new();
        loader.load_nodes(&mut g).unwrap();
        assert!(loader.load_paths(&mut g).is_err());
        assert_eq!(g.channel_count(), 0);
    }

    #[test]
    fn test_conflicting_channel_commits_nothing() {
        let b = backend();
        let config = LoaderConfig::default().threaded(false);
        let session = SessionOptions::default();
        let loader = Loader { backend: &b, session: &session, config: &config };

        let mut g = Graph::new();
        loader.load_nodes(&mut g).unwrap();
        // Channel 100 already joins TX1 and RX11, so the database row
        // TX1 -> RX10 reuses its id.
        let mut stale = Channel::new(ChannelId(100), NodeId(1), NodeId(11));
        stale.paths.insert(PathId(7), Path::new(PathId(7), ChannelId(100)));
        g.register_channel(stale).unwrap();
        let before = g.clone();

        assert!(matches!(loader.load_paths(&mut g), Err(crate::Error::DanglingReference(_))));
        assert_eq!(g, before);
    }

    #[test]
    fn test_continue_policy_reports_failed_shard() {
        let b = backend();
        b.fail_channel_query_on(Role::Rx, 11);
        let config = LoaderConfig::default()
            .threaded(true)
            .with_workers(2)
            .with_shard_failure(ShardFailurePolicy::Continue);
        let session = SessionOptions::default();
        let loader = Loader { backend: &b, session: &session, config: &config };

        let mut g = Graph::new();
        loader.load_nodes(&mut g).unwrap();
        let report = loader.load_paths(&mut g).unwrap();
        assert_eq!(report.shards, 2);
        assert_eq!(report.failed_shards.len(), 1);
        assert!(!report.is_complete());
        assert_eq!(g.channel_count(), 1);
        assert!(g.channel_between(NodeId(1), NodeId(10)).is_some());
    }
}
