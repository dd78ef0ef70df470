//! Transmitter and receiver nodes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use super::{ChannelId, Point3};

/// Node identifier, unique within one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical group a node belongs to (e.g. belt-worn vs chest-worn receivers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SetId(pub i64);

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which end of a link a node sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Tx,
    Rx,
}

impl Role {
    pub fn opposite(self) -> Role {
        match self {
            Role::Tx => Role::Rx,
            Role::Rx => Role::Tx,
        }
    }

    /// Table and column prefix in the simulation schema.
    pub fn table(self) -> &'static str {
        match self {
            Role::Tx => "tx",
            Role::Rx => "rx",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Tx => f.write_str("TX"),
            Role::Rx => f.write_str("RX"),
        }
    }
}

/// A transmitter or receiver.
///
/// `chans_to_pairs` is keyed by the id of the node on the *other* side of
/// the link; the value resolves through [`Graph`](super::Graph) to the one
/// channel shared by both endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    pub coords: Point3,
    pub set_id: SetId,
    pub chans_to_pairs: BTreeMap<NodeId, ChannelId>,
}

impl Node {
    pub fn new(id: NodeId, role: Role, coords: Point3, set_id: SetId) -> Self {
        Self {
            id,
            role,
            coords,
            set_id,
            chans_to_pairs: BTreeMap::new(),
        }
    }

    pub fn is_tx(&self) -> bool {
        self.role == Role::Tx
    }

    /// Channel id towards `peer`, if a ray was traced between them.
    pub fn channel_id_to(&self, peer: NodeId) -> Option<ChannelId> {
        self.chans_to_pairs.get(&peer).copied()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} node {}", self.role, self.id)
    }
}
