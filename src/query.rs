//! SQL templates for the simulation schema.
//!
//! Every query uses positional `?` placeholders and integer parameters only,
//! which both SQLite and MySQL accept. Column order is part of the contract:
//! the backends decode rows by position.

use serde::{Deserialize, Serialize};
use crate::model::{ChannelId, NodeId, Role, SetId};

/// A SQL string plus its positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub sql: String,
    pub params: Vec<i64>,
}

/// Inclusive range of node ids along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdRange {
    pub lo: NodeId,
    pub hi: NodeId,
}

impl IdRange {
    pub fn new(lo: NodeId, hi: NodeId) -> Self {
        Self { lo, hi }
    }

    pub fn single(id: NodeId) -> Self {
        Self { lo: id, hi: id }
    }

    /// The range spanning every possible id.
    pub fn all() -> Self {
        Self { lo: NodeId(i64::MIN), hi: NodeId(i64::MAX) }
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.lo <= id && id <= self.hi
    }
}

impl std::fmt::Display for IdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.lo, self.hi)
    }
}

/// Restricts a node scan. Empty lists mean "no restriction".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFilter {
    pub ids: Vec<NodeId>,
    pub sets: Vec<SetId>,
}

impl NodeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn ids(ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self { ids: ids.into_iter().collect(), sets: Vec::new() }
    }

    pub fn sets(sets: impl IntoIterator<Item = SetId>) -> Self {
        Self { ids: Vec::new(), sets: sets.into_iter().collect() }
    }

    pub fn matches(&self, id: NodeId, set: SetId) -> bool {
        (self.ids.is_empty() || self.ids.contains(&id))
            && (self.sets.is_empty() || self.sets.contains(&set))
    }
}

/// Selects channel summaries whose `axis` endpoint lies in `range`,
/// optionally restricted on the opposite endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFilter {
    pub axis: Role,
    pub range: IdRange,
    pub peers: NodeFilter,
}

impl ChannelFilter {
    pub fn range(axis: Role, range: IdRange) -> Self {
        Self { axis, range, peers: NodeFilter::all() }
    }

    pub fn node(axis: Role, id: NodeId) -> Self {
        Self::range(axis, IdRange::single(id))
    }

    pub fn with_peers(mut self, peers: NodeFilter) -> Self {
        self.peers = peers;
        self
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// Templates
// ============================================================================

/// `id, x, y, z, set_id` for the nodes of one role, by ascending id.
pub fn nodes(role: Role, filter: &NodeFilter) -> Query {
    let t = role.table();
    let mut sql = format!("SELECT {t}_id, x, y, z, {t}_set_id FROM {t}");
    let mut params = Vec::new();
    let mut clauses = Vec::new();

    if !filter.ids.is_empty() {
        clauses.push(format!("{t}_id IN ({})", placeholders(filter.ids.len())));
        params.extend(filter.ids.iter().map(|id| id.0));
    }
    if !filter.sets.is_empty() {
        clauses.push(format!("{t}_set_id IN ({})", placeholders(filter.sets.len())));
        params.extend(filter.sets.iter().map(|s| s.0));
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(&format!(" ORDER BY {t}_id"));
    Query { sql, params }
}

/// `channel_id, received_power, mean_time_of_arrival, delay_spread, tx_id, rx_id`.
pub fn channels(filter: &ChannelFilter) -> Query {
    let axis = filter.axis.table();
    let peer = filter.axis.opposite().table();
    let mut sql = format!(
        "SELECT utd.channel_id, utd.received_power, utd.mean_time_of_arrival, utd.delay_spread, \
         chan.tx_id, chan.rx_id \
         FROM channel_utd utd JOIN channel chan ON utd.channel_id = chan.channel_id \
         WHERE chan.{axis}_id BETWEEN ? AND ?"
    );
    let mut params = vec![filter.range.lo.0, filter.range.hi.0];

    if !filter.peers.ids.is_empty() {
        sql.push_str(&format!(
            " AND chan.{peer}_id IN ({})",
            placeholders(filter.peers.ids.len())
        ));
        params.extend(filter.peers.ids.iter().map(|id| id.0));
    }
    if !filter.peers.sets.is_empty() {
        sql.push_str(&format!(
            " AND chan.{peer}_id IN (SELECT {peer}_id FROM {peer} WHERE {peer}_set_id IN ({}))",
            placeholders(filter.peers.sets.len())
        ));
        params.extend(filter.peers.sets.iter().map(|s| s.0));
    }
    sql.push_str(" ORDER BY chan.tx_id, chan.rx_id");
    Query { sql, params }
}

/// Per-path rows of a channel, strongest first:
/// `path_id, received_power, time_of_arrival, departure_phi, departure_theta,
/// arrival_phi, arrival_theta, freespace_path_loss, cir_phs`.
pub fn paths(channel: ChannelId, limit: Option<usize>) -> Query {
    let mut sql = String::from(
        "SELECT path_id, received_power, time_of_arrival, departure_phi, departure_theta, \
         arrival_phi, arrival_theta, freespace_path_loss, cir_phs FROM path_utd \
         WHERE path_id IN (SELECT path_id FROM path WHERE channel_id = ?) \
         ORDER BY received_power DESC, path_id",
    );
    let mut params = vec![channel.0];
    if let Some(limit) = limit {
        sql.push_str(" LIMIT ?");
        params.push(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    Query { sql, params }
}

/// `x, y, z, interaction_type_id, path_id` for every interaction of a channel.
///
/// Deliberately unordered: the order rows come back in is the order along the ray.
pub fn interactions(channel: ChannelId) -> Query {
    Query {
        sql: "SELECT x, y, z, interaction_type_id, path_id FROM interaction \
              WHERE path_id IN (SELECT path_id FROM path WHERE channel_id = ?)"
            .to_string(),
        params: vec![channel.0],
    }
}

/// `interaction_type_id, description`.
pub fn interaction_types() -> Query {
    Query { sql: "SELECT * FROM interaction_type".to_string(), params: Vec::new() }
}
