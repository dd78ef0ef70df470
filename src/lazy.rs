//! Query-on-access views over a simulation database.
//!
//! [`LazyStorage`] keeps a single connection and builds entities only when
//! asked for them; nothing is cached. Entities use the same units as the
//! eager loaders (mW), so a lazily fetched channel compares equal to the
//! eagerly loaded one apart from its path set.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::loader::assemble::{build_path, channel_from_row};
use crate::model::*;
use crate::query::{ChannelFilter, NodeFilter};
use crate::storage::{Backend, Connection, SessionOptions};
use crate::Result;

/// Lazy handle over one connection.
pub struct LazyStorage<B: Backend> {
    backend: B,
    conn: Mutex<B::Conn>,
}

impl<B: Backend> LazyStorage<B> {
    pub fn connect(backend: B, session: &SessionOptions) -> Result<Self> {
        let conn = backend.connect(session)?;
        tracing::debug!(backend = %backend.describe(), "lazy storage connected");
        Ok(Self { backend, conn: Mutex::new(conn) })
    }

    pub fn txs(&self) -> NodeView<'_, B> {
        NodeView { storage: self, role: Role::Tx }
    }

    pub fn rxs(&self) -> NodeView<'_, B> {
        NodeView { storage: self, role: Role::Rx }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn close(self) -> Result<()> {
        self.conn.into_inner().close()
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// TXs or RXs of the database.
pub struct NodeView<'s, B: Backend> {
    storage: &'s LazyStorage<B>,
    role: Role,
}

impl<'s, B: Backend> NodeView<'s, B> {
    pub fn role(&self) -> Role {
        self.role
    }

    /// Nodes matching `filter`, ascending id.
    pub fn items(&self, filter: &NodeFilter) -> Result<Vec<Node>> {
        let rows = self.storage.conn.lock().fetch_nodes(self.role, filter)?;
        Ok(rows.into_iter().map(|r| r.into_node(self.role)).collect())
    }

    pub fn keys(&self) -> Result<Vec<NodeId>> {
        Ok(self.items(&NodeFilter::all())?.into_iter().map(|n| n.id).collect())
    }

    pub fn get(&self, id: NodeId) -> Result<Option<Node>> {
        Ok(self.items(&NodeFilter::ids([id]))?.into_iter().next())
    }

    /// Channels of node `id`, or `None` if the node does not exist.
    pub fn channels(&self, id: NodeId) -> Result<Option<ChannelView<'s, B>>> {
        Ok(self.get(id)?.map(|node| ChannelView { storage: self.storage, node }))
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Channels from one node to its peers.
pub struct ChannelView<'s, B: Backend> {
    storage: &'s LazyStorage<B>,
    node: Node,
}

impl<'s, B: Backend> ChannelView<'s, B> {
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Channels to the peers matching `peers`, keyed by peer id. Each
    /// channel's `dist` is measured to the peer's coordinates.
    pub fn items(&self, peers: &NodeFilter) -> Result<BTreeMap<NodeId, Channel>> {
        let role = self.node.role;
        let mut conn = self.storage.conn.lock();
        let rows = conn.fetch_channels(&ChannelFilter::node(role, self.node.id).with_peers(peers.clone()))?;
        if rows.is_empty() {
            return Ok(BTreeMap::new());
        }

        let peer_ids = rows.iter().map(|r| r.end(role.opposite()));
        let coords: BTreeMap<NodeId, Point3> = conn
            .fetch_nodes(role.opposite(), &NodeFilter::ids(peer_ids))?
            .into_iter()
            .map(|n| (n.id, n.coords))
            .collect();

        let mut out = BTreeMap::new();
        for row in &rows {
            let peer = row.end(role.opposite());
            // A channel to a node missing from its table has no route.
            let Some(peer_coords) = coords.get(&peer) else { continue };
            let (src, dest) = match role {
                Role::Tx => (self.node.coords, *peer_coords),
                Role::Rx => (*peer_coords, self.node.coords),
            };
            out.insert(peer, channel_from_row(row, src, dest));
        }
        Ok(out)
    }

    pub fn keys(&self) -> Result<Vec<NodeId>> {
        Ok(self.items(&NodeFilter::all())?.into_keys().collect())
    }

    /// Channel to `peer`, `None` when the pair has no channel.
    pub fn get(&self, peer: NodeId) -> Result<Option<Channel>> {
        Ok(self.items(&NodeFilter::ids([peer]))?.remove(&peer))
    }

    pub fn paths(&self, channel: ChannelId) -> PathView<'s, B> {
        PathView { storage: self.storage, channel }
    }
}

// ============================================================================
// Paths
// ============================================================================

/// Every path of one channel, strongest first.
pub struct PathView<'s, B: Backend> {
    storage: &'s LazyStorage<B>,
    channel: ChannelId,
}

impl<'s, B: Backend> PathView<'s, B> {
    pub fn items(&self) -> Result<Vec<Path>> {
        let rows = self.storage.conn.lock().fetch_paths(self.channel, None)?;
        Ok(rows.into_iter().map(|r| build_path(self.channel, r)).collect())
    }

    pub fn keys(&self) -> Result<Vec<PathId>> {
        Ok(self.items()?.into_iter().map(|p| p.id).collect())
    }

    pub fn get(&self, id: PathId) -> Result<Option<Path>> {
        Ok(self.items()?.into_iter().find(|p| p.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn storage() -> LazyStorage<MemoryBackend> {
        let b = MemoryBackend::new();
        b.add_tx(1, [0.0, 0.0, 0.0], 7)
            .add_rx(10, [0.0, 3.0, 4.0], 2)
            .add_rx(11, [1.0, 0.0, 0.0], 3)
            .add_channel(100, 1, 10, 2e-6, 1e-8, 0.0)
            .add_path(100, 5, 1e-6, 1e-8)
            .add_path(100, 6, 3e-6, 2e-8);
        LazyStorage::connect(b, &SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_node_view() {
        let s = storage();
        assert_eq!(s.rxs().keys().unwrap(), vec![NodeId(10), NodeId(11)]);
        assert_eq!(s.txs().get(NodeId(1)).unwrap().unwrap().set_id, SetId(7));
        assert!(s.txs().get(NodeId(99)).unwrap().is_none());
        assert_eq!(s.rxs().items(&NodeFilter::sets([SetId(3)])).unwrap().len(), 1);
    }

    #[test]
    fn test_channel_view_units_and_distance() {
        let s = storage();
        let view = s.txs().channels(NodeId(1)).unwrap().unwrap();
        let ch = view.get(NodeId(10)).unwrap().unwrap();
        assert!((ch.power - 2e-3).abs() < 1e-15);
        assert!((ch.dist - 5.0).abs() < 1e-12);
        assert!(view.get(NodeId(11)).unwrap().is_none());

        let from_rx = s.rxs().channels(NodeId(10)).unwrap().unwrap();
        assert_eq!(from_rx.keys().unwrap(), vec![NodeId(1)]);
    }

    #[test]
    fn test_path_view_get_returns_requested_path() {
        let s = storage();
        let view = s.txs().channels(NodeId(1)).unwrap().unwrap();
        let paths = view.paths(ChannelId(100));
        assert_eq!(paths.keys().unwrap(), vec![PathId(6), PathId(5)]);
        let p = paths.get(PathId(5)).unwrap().unwrap();
        assert_eq!(p.id, PathId(5));
        assert!((p.power - 1e-3).abs() < 1e-15);
        assert!(paths.get(PathId(42)).unwrap().is_none());
    }

    #[test]
    fn test_missing_node_has_no_channel_view() {
        let s = storage();
        assert!(s.rxs().channels(NodeId(404)).unwrap().is_none());
    }
}
