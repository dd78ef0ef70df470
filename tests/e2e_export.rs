//! End-to-end tests for path table and JSON export.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use propdata::export::{self, GroupFilter, PATHS_CSV_HEADER};
use propdata::{DataStorage, Graph, LoaderConfig, MemoryBackend, SetId};

// ============================================================================
// Helper: loaded scene and scratch directory
// ============================================================================

fn loaded() -> DataStorage<MemoryBackend> {
    let b = MemoryBackend::new();
    b.add_tx(1, [0.0, 0.0, 0.0], 1)
        .add_tx(2, [5.0, 0.0, 0.0], 2)
        .add_rx(7, [0.0, 3.0, 4.0], 1)
        .add_rx(8, [5.0, 3.0, 4.0], 1)
        .add_channel(17, 1, 7, 0.011, 1.7e-8, 1e-9)
        .add_path(17, 1, 0.010, 1.67e-8)
        .add_path(17, 2, 0.001, 2.0e-8)
        .add_interaction(2, [0.0, 0.0, 4.0], 1)
        .add_channel(28, 2, 8, 0.001, 1.7e-8, 0.0)
        .add_path(28, 3, 0.001, 1.67e-8);
    let mut s = DataStorage::with_backend(b, LoaderConfig::default());
    s.load_all().unwrap();
    s
}

struct Scratch(PathBuf);

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn scratch(name: &str) -> Scratch {
    let dir = std::env::temp_dir().join(format!("propdata-export-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    Scratch(dir)
}

// ============================================================================
// 1. Path tables
// ============================================================================

#[test]
fn test_dump_every_pair() {
    let s = loaded();
    let dir = scratch("all");
    let files = export::dump_paths(s.graph(), &dir.0, &GroupFilter::all()).unwrap();

    let names: Vec<String> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "Paths@[TX1<->RX7].csv",
            "Paths@[TX1<->RX8].csv",
            "Paths@[TX2<->RX7].csv",
            "Paths@[TX2<->RX8].csv",
        ]
    );

    let table = std::fs::read_to_string(&files[0]).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], PATHS_CSV_HEADER);
    assert_eq!(lines.len(), 3);
    // 10 mW is 10 dBm; the LOS path is 5 m long.
    let first: Vec<&str> = lines[1].split(',').collect();
    assert_eq!(first[1], "10");
    assert_eq!(first[7], "5");
    // The reflected path runs (0,0,0) → (0,0,4) → (0,3,4).
    assert_eq!(lines[2].split(',').last(), Some("7"));

    // No channel between TX1 and RX8: header only.
    let empty = std::fs::read_to_string(&files[1]).unwrap();
    assert_eq!(empty.trim_end(), PATHS_CSV_HEADER);
}

#[test]
fn test_dump_restricted_to_sets() {
    let s = loaded();
    let dir = scratch("sets");
    let files = export::dump_paths(s.graph(), &dir.0, &GroupFilter::sets([SetId(2)], [SetId(1)])).unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| f.to_string_lossy().contains("TX2")));
}

// ============================================================================
// 2. JSON
// ============================================================================

#[test]
fn test_graph_json_round_trip() {
    let s = loaded();
    let mut buf = Vec::new();
    export::write_graph_json(s.graph(), &mut buf).unwrap();
    let back: Graph = serde_json::from_slice(&buf).unwrap();

    let ids = |g: &Graph| -> Vec<(i64, i64, usize)> {
        g.channels().iter().map(|c| (c.src.0, c.dest.0, c.paths.len())).collect()
    };
    assert_eq!(ids(&back), ids(s.graph()));
    assert_eq!(back.interaction_count(), 1);
    let ch = back.tx(propdata::NodeId(1)).unwrap().chan_to(propdata::NodeId(7)).unwrap();
    assert!((ch.dist - 5.0).abs() < 1e-12);
}
