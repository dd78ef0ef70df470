//! Path tables and graph dumps.
//!
//! Writes the loaded paths of each TX/RX pair as a CSV table, one file per
//! pair, or the whole graph as JSON.
//!
//! ```text
//! Graph → dump_paths(dir, groups) → Paths@[TX1<->RX10].csv, ...
//!       → write_graph_json(writer)
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path as FsPath, PathBuf};

use crate::model::*;
use crate::query::NodeFilter;
use crate::Result;

/// Header line of every path table.
pub const PATHS_CSV_HEADER: &str =
    "Delay [sec], Power [dBm], Phase, aoa [deg], eoa [deg], aod [deg], eod [deg], Length [meters]";

/// Which TX/RX pairs [`dump_paths`] writes. Empty filters match every node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupFilter {
    pub txs: NodeFilter,
    pub rxs: NodeFilter,
}

impl GroupFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn sets(tx_sets: impl IntoIterator<Item = SetId>, rx_sets: impl IntoIterator<Item = SetId>) -> Self {
        Self { txs: NodeFilter::sets(tx_sets), rxs: NodeFilter::sets(rx_sets) }
    }
}

/// File name of the path table for one pair.
pub fn paths_file_name(tx: NodeId, rx: NodeId) -> String {
    format!("Paths@[TX{tx}<->RX{rx}].csv")
}

/// Write the paths of `channel` as CSV, strongest first, power in dBm.
/// `None` writes the header only.
pub fn write_paths_csv(channel: Option<&Channel>, writer: &mut dyn Write) -> Result<()> {
    writeln!(writer, "{PATHS_CSV_HEADER}")?;
    let Some(channel) = channel else { return Ok(()) };
    for p in channel.paths_by_power() {
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{}",
            p.delay,
            l2db(p.power),
            p.phase,
            p.aoa,
            p.eoa,
            p.aod,
            p.eod,
            p.length,
        )?;
    }
    Ok(())
}

/// Write one path table per TX/RX pair matching `groups` into `dir`.
///
/// Pairs without a channel still get a file holding only the header.
/// Returns the written files in (TX, RX) order.
pub fn dump_paths(graph: &Graph, dir: impl AsRef<FsPath>, groups: &GroupFilter) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for tx in graph.txs().values().filter(|n| groups.txs.matches(n.id, n.set_id)) {
        for rx in graph.rxs().values().filter(|n| groups.rxs.matches(n.id, n.set_id)) {
            let file = dir.join(paths_file_name(tx.id, rx.id));
            let mut out = BufWriter::new(File::create(&file)?);
            write_paths_csv(graph.channel_between(tx.id, rx.id), &mut out)?;
            out.flush()?;
            written.push(file);
        }
    }
    tracing::info!(files = written.len(), dir = %dir.display(), "path tables written");
    Ok(written)
}

/// Serialize the whole graph as JSON.
pub fn write_graph_json(graph: &Graph, writer: &mut dyn Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, graph)?;
    writeln!(writer)?;
    Ok(())
}
