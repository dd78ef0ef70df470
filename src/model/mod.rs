//! # Propagation Graph Model
//!
//! Plain records for the four entities of a ray-tracing result: nodes
//! (TX/RX), channels, paths and interactions, plus the [`Graph`] that ties
//! them together.
//!
//! Design rule: no database types here. This module is pure data: no I/O
//! and no threads.

pub mod geometry;
pub mod node;
pub mod channel;
pub mod path;
pub mod interaction;
pub mod graph;

pub use geometry::{Point3, l2db, db2l};
pub use node::{Node, NodeId, Role, SetId};
pub use channel::{Channel, ChannelId};
pub use path::{Path, PathId, Interactions};
pub use interaction::{Interaction, InteractionKind, InteractionSlot, InteractionTypes};
pub use graph::{Graph, NodeRef, Registered};
