//! Channel: the aggregate TX → RX link.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use super::{NodeId, Path, PathId};

/// Channel identifier, matching the `channel.channel_id` primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub i64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The directed radio link between one TX (`src`) and one RX (`dest`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub src: NodeId,
    pub dest: NodeId,
    /// Received power summed over all paths, mW.
    pub power: f64,
    /// Mean time of arrival, seconds.
    pub delay: f64,
    /// RMS delay spread, seconds.
    pub delay_spread: f64,
    /// Straight-line TX → RX distance, meters.
    pub dist: f64,
    pub paths: BTreeMap<PathId, Path>,
}

impl Channel {
    pub fn new(id: ChannelId, src: NodeId, dest: NodeId) -> Self {
        Self {
            id,
            src,
            dest,
            power: 0.0,
            delay: 0.0,
            delay_spread: 0.0,
            dist: 0.0,
            paths: BTreeMap::new(),
        }
    }

    /// The endpoint opposite to `from`, or `None` if `from` is on neither end.
    ///
    /// Ids are only unique per role, so the caller states which role it is
    /// asking from.
    pub fn other_end(&self, from_tx: bool, from: NodeId) -> Option<NodeId> {
        match from_tx {
            true if from == self.src => Some(self.dest),
            false if from == self.dest => Some(self.src),
            _ => None,
        }
    }

    /// Paths that passed (or were never checked by) the near-field test.
    pub fn valid_paths(&self) -> impl Iterator<Item = &Path> {
        self.paths.values().filter(|p| !p.near_field_failed)
    }

    /// Power of the paths not flagged as near-field failures, mW.
    pub fn valid_power(&self) -> f64 {
        self.valid_paths().map(|p| p.power).sum()
    }

    /// Paths in descending received power.
    pub fn paths_by_power(&self) -> Vec<&Path> {
        let mut paths: Vec<&Path> = self.paths.values().collect();
        paths.sort_by(|a, b| b.power.total_cmp(&a.power));
        paths
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Sumpow = {}, delay = {}, delay_spread = {}, {} -> {}",
            self.power, self.delay, self.delay_spread, self.src, self.dest
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_other_end() {
        let ch = Channel::new(ChannelId(7), NodeId(1), NodeId(1));
        // Same numeric id on both sides: role decides.
        assert_eq!(ch.other_end(true, NodeId(1)), Some(NodeId(1)));
        let ch = Channel::new(ChannelId(7), NodeId(1), NodeId(2));
        assert_eq!(ch.other_end(true, NodeId(1)), Some(NodeId(2)));
        assert_eq!(ch.other_end(false, NodeId(2)), Some(NodeId(1)));
        assert_eq!(ch.other_end(false, NodeId(1)), None);
    }

    #[test]
    fn test_valid_power_skips_near_field_failures() {
        let mut ch = Channel::new(ChannelId(1), NodeId(1), NodeId(2));
        let mut a = Path::new(PathId(1), ch.id);
        a.power = 2.0;
        let mut b = Path::new(PathId(2), ch.id);
        b.power = 3.0;
        b.near_field_failed = true;
        ch.paths.insert(a.id, a);
        ch.paths.insert(b.id, b);

        assert_eq!(ch.valid_power(), 2.0);
        assert_eq!(ch.paths_by_power()[0].id, PathId(2));
    }
}
