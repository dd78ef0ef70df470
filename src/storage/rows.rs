//! Raw rows as they come out of the simulation database.
//!
//! Power columns are in watts here; the loader converts them to mW.

use crate::model::*;

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: NodeId,
    pub coords: Point3,
    pub set_id: SetId,
}

impl NodeRow {
    pub fn into_node(self, role: Role) -> Node {
        Node::new(self.id, role, self.coords, self.set_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRow {
    pub id: ChannelId,
    pub received_power: f64,
    pub mean_time_of_arrival: f64,
    pub delay_spread: f64,
    pub tx: NodeId,
    pub rx: NodeId,
}

impl ChannelRow {
    /// Endpoint on the given axis.
    pub fn end(&self, role: Role) -> NodeId {
        match role {
            Role::Tx => self.tx,
            Role::Rx => self.rx,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathRow {
    pub id: PathId,
    pub received_power: f64,
    pub time_of_arrival: f64,
    pub departure_phi: f64,
    pub departure_theta: f64,
    pub arrival_phi: f64,
    pub arrival_theta: f64,
    pub freespace_path_loss: f64,
    pub phase: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InteractionRow {
    pub coords: Point3,
    pub kind: InteractionKind,
    pub path: PathId,
}
