//! Benchmarks for the Map-phase completion hot path

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sitecoord::coordination::{PartitionId, Status, TransactionMapCoordinator};
use sitecoord::error::CoordinationResult;
use sitecoord::shuffle::ShuffleSink;
use sitecoord::site::{SiteController, SiteServices};
use sitecoord::txn::MapReduceTransaction;
use std::hint::black_box;
use std::sync::Arc;

/// Accepts hand-offs and drops them
struct DiscardShuffle;

impl ShuffleSink for DiscardShuffle {
    fn enqueue(&self, _ts: Arc<MapReduceTransaction>) -> CoordinationResult<()> {
        Ok(())
    }
}

fn site(partitions: &[PartitionId]) -> Arc<dyn SiteController> {
    Arc::new(
        SiteServices::new(0, partitions.iter().copied())
            .with_shuffle_worker(Arc::new(DiscardShuffle)),
    )
}

fn bench_sequential_completion(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_completion");

    for partitions in [4, 16, 64] {
        let ids: Vec<i32> = (0..partitions).collect();
        let coordinator = Arc::new(TransactionMapCoordinator::new(site(&ids)));

        group.bench_with_input(
            BenchmarkId::from_parameter(partitions),
            &ids,
            |b, ids| {
                let mut txn_id = 0;
                b.iter(|| {
                    txn_id += 1;
                    let ts = MapReduceTransaction::new(txn_id, coordinator.clone());
                    ts.init_map(Box::new(|_| {})).unwrap();
                    for &partition in ids {
                        black_box(ts.map_callback().on_partition_complete(partition).unwrap());
                    }
                    coordinator.finish();
                });
            },
        );
    }

    group.finish();
}

fn bench_abort_path(c: &mut Criterion) {
    let ids: Vec<i32> = (0..16).collect();
    let coordinator = Arc::new(TransactionMapCoordinator::new(site(&ids)));

    c.bench_function("map_abort_backfill_16", |b| {
        let mut txn_id = 0;
        b.iter(|| {
            txn_id += 1;
            let ts = MapReduceTransaction::new(txn_id, coordinator.clone());
            ts.init_map(Box::new(|_| {})).unwrap();
            for &partition in &ids[..8] {
                ts.map_callback().on_partition_complete(partition).unwrap();
            }
            black_box(ts.map_callback().on_abort(Status::Aborted).unwrap());
            coordinator.finish();
        });
    });
}

criterion_group!(benches, bench_sequential_completion, bench_abort_path);
criterion_main!(benches);
