//! The assembled TX/RX graph.
//!
//! Channels live in one arena keyed by [`ChannelId`]; both endpoint nodes
//! hold the same id in their `chans_to_pairs`, so a channel is shared by
//! reference between its TX and its RX. The only way to add a channel is
//! [`Graph::register_channel`], which writes both sides in one step.

use std::collections::BTreeMap;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::*;
use crate::{Error, Result};

/// All nodes, channels and paths loaded from one simulation database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    txs: BTreeMap<NodeId, Node>,
    rxs: BTreeMap<NodeId, Node>,
    channels: HashMap<ChannelId, Channel>,
}

/// Counts from committing channels to a [`Graph`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registered {
    /// Channels newly registered.
    pub channels: usize,
    /// Paths newly inserted, in new or existing channels.
    pub paths: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    /// Insert a node unless one with the same role and id already exists.
    /// Returns true if the node was new.
    pub fn insert_node(&mut self, node: Node) -> bool {
        let table = match node.role {
            Role::Tx => &mut self.txs,
            Role::Rx => &mut self.rxs,
        };
        if table.contains_key(&node.id) {
            return false;
        }
        table.insert(node.id, node);
        true
    }

    pub fn txs(&self) -> &BTreeMap<NodeId, Node> {
        &self.txs
    }

    pub fn rxs(&self) -> &BTreeMap<NodeId, Node> {
        &self.rxs
    }

    pub fn nodes(&self, role: Role) -> &BTreeMap<NodeId, Node> {
        match role {
            Role::Tx => &self.txs,
            Role::Rx => &self.rxs,
        }
    }

    pub fn tx(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.node(Role::Tx, id)
    }

    pub fn rx(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.node(Role::Rx, id)
    }

    pub fn node(&self, role: Role, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes(role).get(&id).map(|node| NodeRef { node, graph: self })
    }

    /// Nodes of one role whose set id is in `sets` (all nodes when `sets` is empty).
    pub fn nodes_in_sets<'g>(
        &'g self,
        role: Role,
        sets: &'g [SetId],
    ) -> impl Iterator<Item = NodeRef<'g>> + 'g {
        self.nodes(role)
            .values()
            .filter(move |n| sets.is_empty() || sets.contains(&n.set_id))
            .map(move |node| NodeRef { node, graph: self })
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty() && self.rxs.is_empty()
    }

    // ========================================================================
    // Channels
    // ========================================================================

    /// Register a channel on both of its endpoints.
    ///
    /// Fill-if-absent: if the TX/RX pair already has a channel, the existing
    /// one is kept and its id returned. Its path set becomes the paths carried
    /// by `channel` (see [`Graph::replace_paths`]).
    pub fn register_channel(&mut self, channel: Channel) -> Result<ChannelId> {
        self.check_channel(&channel)?;
        Ok(self.commit_channel(channel).0)
    }

    /// Register a batch of channels. Every channel is checked before the
    /// graph is touched, so on error nothing from the batch is registered.
    pub fn register_channels(&mut self, channels: Vec<Channel>) -> Result<Registered> {
        let mut claimed: HashMap<ChannelId, (NodeId, NodeId)> = HashMap::new();
        for ch in &channels {
            self.check_channel(ch)?;
            if self.channel_between(ch.src, ch.dest).is_some() {
                continue;
            }
            if let Some(other) = claimed.insert(ch.id, (ch.src, ch.dest)) {
                if other != (ch.src, ch.dest) {
                    return Err(Error::DanglingReference(format!(
                        "channel {} appears for TX {} -> RX {} and TX {} -> RX {}",
                        ch.id, other.0, other.1, ch.src, ch.dest
                    )));
                }
            }
        }

        let mut total = Registered::default();
        for ch in channels {
            let (_, done) = self.commit_channel(ch);
            total.channels += done.channels;
            total.paths += done.paths;
        }
        Ok(total)
    }

    fn check_channel(&self, channel: &Channel) -> Result<()> {
        if !self.txs.contains_key(&channel.src) {
            return Err(Error::DanglingReference(format!(
                "channel {} starts at unknown TX {}",
                channel.id, channel.src
            )));
        }
        if !self.rxs.contains_key(&channel.dest) {
            return Err(Error::DanglingReference(format!(
                "channel {} points at unknown RX {}",
                channel.id, channel.dest
            )));
        }
        if self.channel_between(channel.src, channel.dest).is_none()
            && self.channels.contains_key(&channel.id)
        {
            return Err(Error::DanglingReference(format!(
                "channel {} already registered for another TX/RX pair",
                channel.id
            )));
        }
        Ok(())
    }

    /// Insert a checked channel.
    fn commit_channel(&mut self, channel: Channel) -> (ChannelId, Registered) {
        let existing = self.txs.get(&channel.src).and_then(|n| n.channel_id_to(channel.dest));
        if let Some(existing) = existing {
            let paths = self.replace_paths(existing, channel.paths);
            return (existing, Registered { channels: 0, paths });
        }

        let id = channel.id;
        let paths = channel.paths.len();
        if let Some(tx) = self.txs.get_mut(&channel.src) {
            tx.chans_to_pairs.insert(channel.dest, id);
        }
        if let Some(rx) = self.rxs.get_mut(&channel.dest) {
            rx.chans_to_pairs.insert(channel.src, id);
        }
        self.channels.insert(id, channel);
        (id, Registered { channels: 1, paths })
    }

    /// Make `paths` the path set of a channel.
    ///
    /// A path already present under the same id is kept as it is, with its
    /// interactions and near-field flag. Paths not in `paths` are dropped.
    /// Returns how many paths were added.
    pub fn replace_paths(&mut self, channel: ChannelId, paths: BTreeMap<PathId, Path>) -> usize {
        let Some(ch) = self.channels.get_mut(&channel) else {
            return 0;
        };
        let mut old = std::mem::take(&mut ch.paths);
        let mut added = 0;
        ch.paths = paths
            .into_iter()
            .map(|(id, fresh)| match old.remove(&id) {
                Some(kept) => (id, kept),
                None => {
                    added += 1;
                    (id, fresh)
                }
            })
            .collect();
        added
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.get(&id)
    }

    /// Channel between a TX and an RX; `None` when no ray was traced.
    pub fn channel_between(&self, tx: NodeId, rx: NodeId) -> Option<&Channel> {
        self.txs
            .get(&tx)
            .and_then(|n| n.channel_id_to(rx))
            .and_then(|id| self.channels.get(&id))
    }

    /// Channels in ascending id order.
    pub fn channels(&self) -> Vec<&Channel> {
        let mut all: Vec<&Channel> = self.channels.values().collect();
        all.sort_by_key(|c| c.id);
        all
    }

    /// Channels registered on one node (either role).
    pub fn channels_of(&self, role: Role, id: NodeId) -> Vec<&Channel> {
        self.nodes(role)
            .get(&id)
            .map(|n| {
                n.chans_to_pairs
                    .values()
                    .filter_map(|cid| self.channels.get(cid))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // ========================================================================
    // Paths
    // ========================================================================

    pub fn path(&self, channel: ChannelId, path: PathId) -> Option<&Path> {
        self.channels.get(&channel).and_then(|c| c.paths.get(&path))
    }

    /// Mutable access to one path, e.g. to set `near_field_failed`.
    pub fn path_mut(&mut self, channel: ChannelId, path: PathId) -> Option<&mut Path> {
        self.channels.get_mut(&channel).and_then(|c| c.paths.get_mut(&path))
    }

    /// Every path of every channel, mutably.
    pub fn paths_mut(&mut self) -> impl Iterator<Item = &mut Path> {
        self.channels.values_mut().flat_map(|c| c.paths.values_mut())
    }

    /// Replace a path's interaction list and geometric length.
    /// Returns false if the path is unknown.
    pub fn set_interactions(
        &mut self,
        channel: ChannelId,
        path: PathId,
        interactions: Interactions,
        length: f64,
    ) -> bool {
        match self.path_mut(channel, path) {
            Some(p) => {
                p.interactions = interactions;
                p.length = length;
                true
            }
            None => false,
        }
    }

    pub fn path_count(&self) -> usize {
        self.channels.values().map(|c| c.paths.len()).sum()
    }

    pub fn interaction_count(&self) -> usize {
        self.channels
            .values()
            .flat_map(|c| c.paths.values())
            .map(|p| p.interactions.len())
            .sum()
    }
}

// ============================================================================
// NodeRef
// ============================================================================

/// A node together with the graph it lives in, so its channels can be resolved.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'g> {
    node: &'g Node,
    graph: &'g Graph,
}

impl<'g> NodeRef<'g> {
    pub fn node(&self) -> &'g Node {
        self.node
    }

    /// Channel to the node `peer` on the opposite side; `None` when there is no route.
    pub fn chan_to(&self, peer: NodeId) -> Option<&'g Channel> {
        self.node
            .channel_id_to(peer)
            .and_then(|id| self.graph.channels.get(&id))
    }

    /// `(peer node, channel)` for every channel of this node, by ascending peer id.
    pub fn chans_to_pairs(&self) -> impl Iterator<Item = (&'g Node, &'g Channel)> + 'g {
        let graph = self.graph;
        let peers = graph.nodes(self.node.role.opposite());
        self.node.chans_to_pairs.iter().filter_map(move |(peer, cid)| {
            Some((peers.get(peer)?, graph.channels.get(cid)?))
        })
    }
}

impl std::ops::Deref for NodeRef<'_> {
    type Target = Node;

    fn deref(&self) -> &Node {
        self.node
    }
}
