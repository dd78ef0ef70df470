//! End-to-end tests for the sharded loaders.
//!
//! Tests threaded/sequential equivalence, shard failure policies,
//! per-worker connections, timeouts and cancellation against MemoryBackend.

use std::time::Duration;

use pretty_assertions::assert_eq;
use propdata::{
    DataStorage, Error, Graph, IdRange, LoadMode, LoaderConfig, MemoryBackend, NodeId, Role,
    ShardFailurePolicy,
};

// ============================================================================
// Helper: a grid scene with many RXs and a few TXs
// ============================================================================

const TXS: i64 = 3;
const RXS: i64 = 12;

/// Every TX reaches every RX except where `(tx + rx) % 5 == 0`. Each
/// channel has three paths; the weakest one bounces off the floor.
fn grid() -> MemoryBackend {
    let b = MemoryBackend::new();
    for t in 1..=TXS {
        b.add_tx(t, [t as f64 * 4.0, 0.0, 2.0], 1);
    }
    for r in 1..=RXS {
        b.add_rx(r, [(r % 4) as f64 * 3.0, (r / 4) as f64 * 3.0 + 1.0, 1.0], r % 3);
    }

    let mut path_id = 1;
    for t in 1..=TXS {
        for r in 1..=RXS {
            if (t + r) % 5 == 0 {
                continue;
            }
            let ch = t * 100 + r;
            b.add_channel(ch, t, r, 1e-5, 2e-8, 1e-9);
            for (k, power) in [3e-6, 2e-6, 1e-6].into_iter().enumerate() {
                b.add_path(ch, path_id, power, 2e-8 + k as f64 * 1e-9);
                if k == 2 {
                    b.add_interaction(path_id, [t as f64, r as f64, 0.0], 1);
                }
                path_id += 1;
            }
        }
    }
    b
}

fn load(backend: MemoryBackend, config: LoaderConfig) -> propdata::Result<DataStorage<MemoryBackend>> {
    let mut s = DataStorage::with_backend(backend, config);
    s.load_rxtx()?;
    s.load_paths(2)?;
    s.load_interactions(true)?;
    Ok(s)
}

/// `(tx, rx, path, interaction points)` for every loaded path.
fn fingerprint(g: &Graph) -> Vec<(i64, i64, i64, Vec<[f64; 3]>)> {
    let mut out = Vec::new();
    for ch in g.channels() {
        for p in ch.paths.values() {
            let points = p.interaction_points().map(|c| [c.x, c.y, c.z]).collect();
            out.push((ch.src.0, ch.dest.0, p.id.0, points));
        }
    }
    out.sort_by_key(|(t, r, p, _)| (*t, *r, *p));
    out
}

// ============================================================================
// 1. Threaded and sequential loads agree
// ============================================================================

#[test]
fn test_threaded_equals_sequential() {
    let seq = load(grid(), LoaderConfig::default().threaded(false)).unwrap();
    for workers in [1, 2, 4, 7, 32] {
        let par = load(grid(), LoaderConfig::default().threaded(true).with_workers(workers)).unwrap();
        assert_eq!(fingerprint(par.graph()), fingerprint(seq.graph()));
        assert_eq!(par.graph(), seq.graph());
    }
}

#[test]
fn test_remote_backends_thread_by_default() {
    let mut s = DataStorage::with_backend(grid().as_remote(), LoaderConfig::default().with_workers(4));
    s.load_rxtx().unwrap();
    let report = s.load_paths(2).unwrap();
    assert_eq!(report.mode, LoadMode::Threaded { axis: Role::Rx, workers: 4 });
    assert_eq!(report.shards, 4);
}

#[test]
fn test_embedded_backends_load_sequentially_by_default() {
    let mut s = DataStorage::with_backend(grid(), LoaderConfig::default());
    s.load_rxtx().unwrap();
    let report = s.load_paths(2).unwrap();
    assert_eq!(report.mode, LoadMode::Sequential);
    assert_eq!(report.shards, 1);
}

#[test]
fn test_one_connection_per_shard() {
    let backend = grid();
    let mut s = DataStorage::with_backend(backend.clone(), LoaderConfig::default().threaded(true).with_workers(3));
    s.load_rxtx().unwrap();
    let before = backend.connections_opened();
    let report = s.load_paths(2).unwrap();
    assert_eq!(report.shards, 3);
    assert_eq!(backend.connections_opened() - before, 3);
}

// ============================================================================
// 2. Shard failure policies
// ============================================================================

fn failing(policy: ShardFailurePolicy) -> (MemoryBackend, DataStorage<MemoryBackend>) {
    let backend = grid();
    let config = LoaderConfig::default().threaded(true).with_workers(4).with_shard_failure(policy);
    let mut s = DataStorage::with_backend(backend.clone(), config);
    s.load_rxtx().unwrap();
    // RX ids 1..=12 over 4 workers: the second shard is 4..=6.
    backend.fail_channel_query_on(Role::Rx, 5);
    (backend, s)
}

#[test]
fn test_abort_merges_nothing() {
    let (_, mut s) = failing(ShardFailurePolicy::Abort);
    let err = s.load_paths(2).unwrap_err();
    match err {
        Error::ShardFailure { axis, range, source } => {
            assert_eq!(axis, Role::Rx);
            assert_eq!(range, IdRange::new(NodeId(4), NodeId(6)));
            assert!(matches!(*source, Error::Query(_)));
        }
        other => panic!("expected shard failure, got {other:?}"),
    }
    assert_eq!(s.graph().channel_count(), 0);
    assert!(matches!(s.load_interactions(true), Err(Error::OrderingViolation { .. })));
}

#[test]
fn test_continue_keeps_other_shards() {
    let (_, mut s) = failing(ShardFailurePolicy::Continue);
    let report = s.load_paths(2).unwrap();
    assert_eq!(report.failed_shards.len(), 1);
    assert_eq!(report.failed_shards[0].range, IdRange::new(NodeId(4), NodeId(6)));

    let g = s.graph();
    assert!(g.channels().iter().all(|c| !(4..=6).contains(&c.dest.0)));
    assert!(g.rx(NodeId(7)).unwrap().chans_to_pairs().count() > 0);
}

#[test]
fn test_retry_recovers_from_transient_connect_failure() {
    let backend = grid();
    let config = LoaderConfig::default()
        .threaded(true)
        .with_workers(2)
        .with_shard_failure(ShardFailurePolicy::Retry { attempts: 2 });
    let mut s = DataStorage::with_backend(backend.clone(), config);
    s.load_rxtx().unwrap();

    backend.fail_next_connects(1);
    let report = s.load_paths(2).unwrap();
    assert!(report.is_complete());

    let reference = load(grid(), LoaderConfig::default()).unwrap();
    assert_eq!(s.graph().channel_count(), reference.graph().channel_count());
}

#[test]
fn test_retry_gives_up_on_persistent_failure() {
    let (_, mut s) = failing(ShardFailurePolicy::Retry { attempts: 2 });
    assert!(matches!(s.load_paths(2), Err(Error::ShardFailure { .. })));
    assert_eq!(s.graph().channel_count(), 0);
}

// ============================================================================
// 3. Timeouts and cancellation
// ============================================================================

#[test]
fn test_query_timeout() {
    let backend = grid();
    let config = LoaderConfig::default()
        .threaded(false)
        .with_query_timeout(Duration::from_millis(5));
    let mut s = DataStorage::with_backend(backend.clone(), config);
    backend.with_latency(Duration::from_millis(50));
    assert!(matches!(s.load_rxtx(), Err(Error::Timeout(_))));
    assert!(s.graph().is_empty());
}

#[test]
fn test_cancelled_load_merges_nothing() {
    let backend = grid();
    let mut s = DataStorage::with_backend(
        backend.clone(),
        LoaderConfig::default().threaded(true).with_workers(2).with_shard_failure(ShardFailurePolicy::Continue),
    );
    s.load_rxtx().unwrap();

    let token = s.cancel_token();
    token.cancel();
    assert!(matches!(s.load_paths(2), Err(Error::Cancelled)));
    assert_eq!(s.graph().channel_count(), 0);

    token.reset();
    s.load_paths(2).unwrap();
    assert!(s.graph().channel_count() > 0);
}

#[test]
fn test_cancel_from_another_thread() {
    let backend = grid();
    backend.with_latency(Duration::from_millis(20));
    let mut s = DataStorage::with_backend(backend.clone(), LoaderConfig::default().threaded(false));
    s.load_rxtx().unwrap();

    let token = s.cancel_token();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        token.cancel();
    });
    let result = s.load_paths(2);
    canceller.join().unwrap();

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(s.graph().channel_count(), 0);
}
