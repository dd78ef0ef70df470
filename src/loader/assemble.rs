//! Row → entity assembly shared by the sequential and threaded loaders.
//!
//! Everything here reads the graph and a connection and returns owned
//! results; nothing mutates the shared [`Graph`]. The caller commits the
//! results once the whole phase (or shard) has succeeded.

use crate::model::*;
use crate::query::{ChannelFilter, IdRange};
use crate::storage::{CancelToken, ChannelRow, Connection, InteractionRow, PathRow};
use crate::{Error, Result};

/// Database powers are watts; the graph holds mW.
const W_TO_MW: f64 = 1e3;

/// Computed interactions and length for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathInteractions {
    pub channel: ChannelId,
    pub path: PathId,
    pub interactions: Interactions,
    pub length: f64,
}

pub(crate) fn build_channel(graph: &Graph, row: &ChannelRow) -> Result<Channel> {
    let src = graph.txs().get(&row.tx).ok_or_else(|| {
        Error::DanglingReference(format!("channel {} starts at unknown TX {}", row.id, row.tx))
    })?;
    let dest = graph.rxs().get(&row.rx).ok_or_else(|| {
        Error::DanglingReference(format!("channel {} points at unknown RX {}", row.id, row.rx))
    })?;

    Ok(channel_from_row(row, src.coords, dest.coords))
}

/// Channel for a summary row whose endpoints sit at `src` and `dest`.
pub(crate) fn channel_from_row(row: &ChannelRow, src: Point3, dest: Point3) -> Channel {
    let mut ch = Channel::new(row.id, row.tx, row.rx);
    ch.power = row.received_power * W_TO_MW;
    ch.delay = row.mean_time_of_arrival;
    ch.delay_spread = row.delay_spread;
    ch.dist = src.distance(&dest);
    ch
}

pub(crate) fn build_path(channel: ChannelId, row: PathRow) -> Path {
    let mut p = Path::new(row.id, channel);
    p.power = row.received_power * W_TO_MW;
    p.delay = row.time_of_arrival;
    p.aod = row.departure_phi;
    p.eod = row.departure_theta;
    p.aoa = row.arrival_phi;
    p.eoa = row.arrival_theta;
    p.fspl = row.freespace_path_loss;
    p.phase = row.phase;
    p
}

/// Channels (with their top-`npaths` paths) whose `axis` endpoint lies in `range`.
///
/// With `per_node` the channel summaries are fetched one node at a time, in
/// ascending id order; otherwise a single range query covers the whole range.
pub(crate) fn fetch_channels<C: Connection>(
    conn: &mut C,
    graph: &Graph,
    axis: Role,
    range: IdRange,
    npaths: usize,
    per_node: bool,
    cancel: &CancelToken,
) -> Result<Vec<Channel>> {
    let rows = if per_node {
        let mut rows = Vec::new();
        for id in graph.nodes(axis).range(range.lo..=range.hi).map(|(id, _)| *id) {
            cancel.check()?;
            rows.extend(conn.fetch_channels(&ChannelFilter::node(axis, id))?);
        }
        rows
    } else {
        conn.fetch_channels(&ChannelFilter::range(axis, range))?
    };

    let mut channels = Vec::with_capacity(rows.len());
    for row in &rows {
        cancel.check()?;
        let mut ch = build_channel(graph, row)?;
        for path_row in conn.fetch_paths(ch.id, Some(npaths))? {
            let path = build_path(ch.id, path_row);
            ch.paths.entry(path.id).or_insert(path);
        }
        channels.push(ch);
    }
    Ok(channels)
}

/// Thread one channel's interaction rows onto its paths.
///
/// Rows keep their database order. Each path's length starts at the TX,
/// visits its interactions in that order and ends at the RX. Rows for paths
/// the channel does not hold are skipped.
pub fn thread_interactions(
    channel: &Channel,
    src: Point3,
    dest: Point3,
    rows: &[InteractionRow],
    store: bool,
) -> Vec<PathInteractions> {
    channel
        .paths
        .values()
        .map(|path| {
            let mut interactions = Interactions::new();
            let mut prev = src;
            let mut length = 0.0;
            for row in rows.iter().filter(|r| r.path == path.id) {
                length += prev.distance(&row.coords);
                prev = row.coords;
                interactions.push(if store {
                    InteractionSlot::Recorded(Interaction {
                        coords: row.coords,
                        kind: row.kind,
                        path: path.id,
                    })
                } else {
                    InteractionSlot::CountedOnly
                });
            }
            length += prev.distance(&dest);
            PathInteractions { channel: channel.id, path: path.id, interactions, length }
        })
        .collect()
}

/// Interactions for every channel of the `axis` nodes in `range`.
pub(crate) fn fetch_interactions<C: Connection>(
    conn: &mut C,
    graph: &Graph,
    axis: Role,
    range: IdRange,
    store: bool,
    cancel: &CancelToken,
) -> Result<Vec<PathInteractions>> {
    let mut out = Vec::new();
    for (id, _) in graph.nodes(axis).range(range.lo..=range.hi) {
        for channel in graph.channels_of(axis, *id) {
            cancel.check()?;
            let (Some(src), Some(dest)) = (graph.txs().get(&channel.src), graph.rxs().get(&channel.dest)) else {
                return Err(Error::DanglingReference(format!(
                    "channel {} lost an endpoint",
                    channel.id
                )));
            };
            let rows = conn.fetch_interactions(channel.id)?;
            out.extend(thread_interactions(channel, src.coords, dest.coords, &rows, store));
        }
    }
    Ok(out)
}
