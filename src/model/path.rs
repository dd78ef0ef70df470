//! Path: one ray-traced propagation route within a channel.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use super::{ChannelId, InteractionSlot, Point3};

/// Path identifier (`path_utd.path_id`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathId(pub i64);

impl std::fmt::Display for PathId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Interactions along one ray, in order of travel.
pub type Interactions = SmallVec<[InteractionSlot; 4]>;

/// A single ray between the two endpoints of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    pub id: PathId,
    pub channel: ChannelId,
    /// Received power, mW.
    pub power: f64,
    pub phase: f64,
    /// Time of arrival, seconds.
    pub delay: f64,
    /// Azimuth of departure, degrees.
    pub aod: f64,
    /// Elevation of departure, degrees.
    pub eod: f64,
    /// Azimuth of arrival, degrees.
    pub aoa: f64,
    /// Elevation of arrival, degrees.
    pub eoa: f64,
    pub fspl: f64,
    /// Set by near-field validation code downstream; never by the loader.
    pub near_field_failed: bool,
    /// Geometric length through all interactions, meters.
    pub length: f64,
    pub interactions: Interactions,
}

impl Path {
    pub fn new(id: PathId, channel: ChannelId) -> Self {
        Self {
            id,
            channel,
            power: 0.0,
            phase: 0.0,
            delay: 0.0,
            aod: 0.0,
            eod: 0.0,
            aoa: 0.0,
            eoa: 0.0,
            fspl: 0.0,
            near_field_failed: false,
            length: 0.0,
            interactions: Interactions::new(),
        }
    }

    /// Line of sight: no interaction on the way.
    pub fn is_los(&self) -> bool {
        self.interactions.is_empty()
    }

    /// Coordinates of recorded interactions in travel order.
    ///
    /// Empty when interactions were only counted.
    pub fn interaction_points(&self) -> impl Iterator<Item = Point3> + '_ {
        self.interactions
            .iter()
            .filter_map(|slot| slot.recorded().map(|i| i.coords))
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Inters = {}, pow = {} mW, len = {} m, [Az:{},El:{}]-->[Az:{},El:{}]",
            self.interactions.len(),
            self.power,
            self.length,
            self.aod,
            self.eod,
            self.aoa,
            self.eoa,
        )
    }
}
