//! In-memory storage backend.
//!
//! The reference implementation of [`Backend`]. Rows are seeded through
//! builder methods and kept in plain maps behind a `RwLock`; every
//! connection sees the same rows and answers queries with the same
//! ordering rules as the SQL templates.
//!
//! ## Fault injection
//!
//! Tests can make the next connects fail, make the channel query fail for
//! any range containing a given node, make the path query of one channel
//! fail, or add per-query latency to exercise timeouts.
//!
//! Use this backend for:
//! - Testing the loaders without a database file
//! - Embedding small synthetic scenes

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::model::*;
use crate::query::{ChannelFilter, NodeFilter};
use crate::{Error, Result};
use super::{Backend, Connection, SessionOptions};
use super::rows::*;

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory simulation database.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<Tables>,
    faults: Mutex<Faults>,
    connects: AtomicU64,
    remote: std::sync::atomic::AtomicBool,
}

#[derive(Default)]
struct Tables {
    txs: BTreeMap<NodeId, NodeRow>,
    rxs: BTreeMap<NodeId, NodeRow>,
    channels: BTreeMap<ChannelId, ChannelRow>,
    /// path id → (owning channel, row)
    paths: BTreeMap<PathId, (ChannelId, PathRow)>,
    /// Insertion order is database order.
    interactions: Vec<InteractionRow>,
    interaction_types: BTreeMap<i64, String>,
}

#[derive(Default)]
struct Faults {
    failing_connects: u32,
    channel_query_fails_on: BTreeSet<(bool, NodeId)>,
    path_query_fails_on: BTreeSet<ChannelId>,
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report as a remote backend, so loaders thread by default.
    pub fn as_remote(self) -> Self {
        self.inner.remote.store(true, Ordering::Relaxed);
        self
    }

    // ========================================================================
    // Seeding
    // ========================================================================

    pub fn add_node(&self, role: Role, id: i64, coords: [f64; 3], set_id: i64) -> &Self {
        let row = NodeRow { id: NodeId(id), coords: coords.into(), set_id: SetId(set_id) };
        let mut t = self.inner.tables.write();
        match role {
            Role::Tx => t.txs.insert(row.id, row),
            Role::Rx => t.rxs.insert(row.id, row),
        };
        self
    }

    pub fn add_tx(&self, id: i64, coords: [f64; 3], set_id: i64) -> &Self {
        self.add_node(Role::Tx, id, coords, set_id)
    }

    pub fn add_rx(&self, id: i64, coords: [f64; 3], set_id: i64) -> &Self {
        self.add_node(Role::Rx, id, coords, set_id)
    }

    /// Channel summary; `power` in watts.
    pub fn add_channel(
        &self,
        id: i64,
        tx: i64,
        rx: i64,
        power: f64,
        delay: f64,
        delay_spread: f64,
    ) -> &Self {
        let row = ChannelRow {
            id: ChannelId(id),
            received_power: power,
            mean_time_of_arrival: delay,
            delay_spread,
            tx: NodeId(tx),
            rx: NodeId(rx),
        };
        self.inner.tables.write().channels.insert(row.id, row);
        self
    }

    /// Path with the given power (watts) and time of arrival; other columns
    /// are derived from the id so rows stay distinguishable.
    pub fn add_path(&self, channel: i64, id: i64, power: f64, delay: f64) -> &Self {
        let k = id as f64;
        self.add_path_row(
            channel,
            PathRow {
                id: PathId(id),
                received_power: power,
                time_of_arrival: delay,
                departure_phi: k,
                departure_theta: -k,
                arrival_phi: 2.0 * k,
                arrival_theta: -2.0 * k,
                freespace_path_loss: 60.0 + k,
                phase: k / 10.0,
            },
        )
    }

    pub fn add_path_row(&self, channel: i64, row: PathRow) -> &Self {
        self.inner.tables.write().paths.insert(row.id, (ChannelId(channel), row));
        self
    }

    /// Append an interaction; call order is the order along the ray.
    pub fn add_interaction(&self, path: i64, coords: [f64; 3], kind: i64) -> &Self {
        self.inner.tables.write().interactions.push(InteractionRow {
            coords: coords.into(),
            kind: InteractionKind(kind),
            path: PathId(path),
        });
        self
    }

    pub fn add_interaction_type(&self, code: i64, description: &str) -> &Self {
        self.inner.tables.write().interaction_types.insert(code, description.to_string());
        self
    }

    // ========================================================================
    // Fault injection + introspection
    // ========================================================================

    /// The next `n` calls to `connect` fail.
    pub fn fail_next_connects(&self, n: u32) -> &Self {
        self.inner.faults.lock().failing_connects = n;
        self
    }

    /// Channel queries whose range covers `node` on `axis` fail.
    pub fn fail_channel_query_on(&self, axis: Role, node: i64) -> &Self {
        self.inner.faults.lock().channel_query_fails_on.insert((axis == Role::Tx, NodeId(node)));
        self
    }

    /// The path query of `channel` fails.
    pub fn fail_path_query_on(&self, channel: i64) -> &Self {
        self.inner.faults.lock().path_query_fails_on.insert(ChannelId(channel));
        self
    }

    pub fn clear_faults(&self) -> &Self {
        *self.inner.faults.lock() = Faults::default();
        self
    }

    /// Every query takes at least this long.
    pub fn with_latency(&self, latency: Duration) -> &Self {
        self.inner.faults.lock().latency = Some(latency);
        self
    }

    /// Successful connects so far.
    pub fn connections_opened(&self) -> u64 {
        self.inner.connects.load(Ordering::Relaxed)
    }
}

impl Backend for MemoryBackend {
    type Conn = MemoryConnection;

    fn connect(&self, session: &SessionOptions) -> Result<MemoryConnection> {
        {
            let mut faults = self.inner.faults.lock();
            if faults.failing_connects > 0 {
                faults.failing_connects -= 1;
                return Err(Error::ConnectionFailure("memory backend: injected connect failure".into()));
            }
        }
        self.inner.connects.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConnection { inner: Arc::clone(&self.inner), session: session.clone() })
    }

    fn is_remote(&self) -> bool {
        self.inner.remote.load(Ordering::Relaxed)
    }

    fn describe(&self) -> String {
        "In-memory simulation database".to_string()
    }
}

// ============================================================================
// MemoryConnection
// ============================================================================

pub struct MemoryConnection {
    inner: Arc<MemoryInner>,
    session: SessionOptions,
}

impl MemoryConnection {
    /// Cancellation, latency and timeout, applied before every query.
    fn round_trip(&self) -> Result<()> {
        self.session.cancel.check()?;
        let latency = self.inner.faults.lock().latency;
        if let Some(latency) = latency {
            if let Some(timeout) = self.session.query_timeout.filter(|t| latency > *t) {
                std::thread::sleep(timeout);
                return Err(Error::Timeout(timeout));
            }
            std::thread::sleep(latency);
            self.session.cancel.check()?;
        }
        Ok(())
    }
}

impl Connection for MemoryConnection {
    fn fetch_nodes(&mut self, role: Role, filter: &NodeFilter) -> Result<Vec<NodeRow>> {
        self.round_trip()?;
        let t = self.inner.tables.read();
        let table = match role {
            Role::Tx => &t.txs,
            Role::Rx => &t.rxs,
        };
        Ok(table
            .values()
            .filter(|n| filter.matches(n.id, n.set_id))
            .cloned()
            .collect())
    }

    fn fetch_channels(&mut self, filter: &ChannelFilter) -> Result<Vec<ChannelRow>> {
        self.round_trip()?;
        let failing = self
            .inner
            .faults
            .lock()
            .channel_query_fails_on
            .iter()
            .any(|(is_tx, node)| *is_tx == (filter.axis == Role::Tx) && filter.range.contains(*node));
        if failing {
            return Err(Error::Query(format!(
                "memory backend: injected channel query failure on {} {}",
                filter.axis, filter.range
            )));
        }

        let t = self.inner.tables.read();
        let peer_role = filter.axis.opposite();
        let peers = match peer_role {
            Role::Tx => &t.txs,
            Role::Rx => &t.rxs,
        };
        let mut rows: Vec<ChannelRow> = t
            .channels
            .values()
            .filter(|c| filter.range.contains(c.end(filter.axis)))
            .filter(|c| {
                let peer = c.end(peer_role);
                let peer_filter = &filter.peers;
                (peer_filter.ids.is_empty() || peer_filter.ids.contains(&peer))
                    && (peer_filter.sets.is_empty()
                        || peers.get(&peer).is_some_and(|n| peer_filter.sets.contains(&n.set_id)))
            })
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.tx, c.rx));
        Ok(rows)
    }

    fn fetch_paths(&mut self, channel: ChannelId, limit: Option<usize>) -> Result<Vec<PathRow>> {
        self.round_trip()?;
        if self.inner.faults.lock().path_query_fails_on.contains(&channel) {
            return Err(Error::Query(format!(
                "memory backend: injected path query failure on channel {channel}"
            )));
        }
        let t = self.inner.tables.read();
        let mut rows: Vec<PathRow> = t
            .paths
            .values()
            .filter(|(owner, _)| *owner == channel)
            .map(|(_, row)| row.clone())
            .collect();
        rows.sort_by(|a, b| {
            b.received_power
                .total_cmp(&a.received_power)
                .then(a.id.cmp(&b.id))
        });
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn fetch_interactions(&mut self, channel: ChannelId) -> Result<Vec<InteractionRow>> {
        self.round_trip()?;
        let t = self.inner.tables.read();
        Ok(t.interactions
            .iter()
            .filter(|i| t.paths.get(&i.path).is_some_and(|(owner, _)| *owner == channel))
            .cloned()
            .collect())
    }

    fn fetch_interaction_types(&mut self) -> Result<Vec<(i64, String)>> {
        self.round_trip()?;
        let t = self.inner.tables.read();
        Ok(t.interaction_types.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
