//! Pipeline benchmarks: cache-miss cost per stage and cache-hit overhead.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

use interface_optimizer::{
    AgentId, BitVector, ConsensusStore, Interface, InterfaceCodec, OptimizationEngine,
    StochasticTransform, StochasticTransformUnit, TransformConfig,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_interface(fields: usize, salt: u64) -> Interface {
    (0..fields)
        .map(|i| (format!("param_{i}"), (salt as f64) + 1.5 * i as f64))
        .collect()
}

fn make_engine() -> Arc<OptimizationEngine> {
    Arc::new(
        OptimizationEngine::with_parameters(10.0, 10.0, 64, 3, Arc::new(ConsensusStore::default()))
            .expect("engine"),
    )
}

// ---------------------------------------------------------------------------
// Bench: transform sampling by shot count
// ---------------------------------------------------------------------------

fn bench_transform_shots(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform_shots");
    let input = BitVector::parse(&"01".repeat(32)).expect("bits");

    for shots in [10u32, 100, 1000] {
        let unit = StochasticTransformUnit::new(TransformConfig {
            shots,
            ..TransformConfig::default()
        })
        .expect("unit");
        group.bench_with_input(BenchmarkId::from_parameter(shots), &unit, |b, unit| {
            b.iter(|| unit.process(black_box(&input)).expect("process"));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Bench: codec encode + decode
// ---------------------------------------------------------------------------

fn bench_codec(c: &mut Criterion) {
    let codec = InterfaceCodec::new(64);
    let iface = make_interface(4, 7).with("mode", "fast");

    c.bench_function("codec_encode_decode", |b| {
        b.iter(|| {
            let encoded = codec.encode(black_box(&iface)).expect("encode");
            codec.decode(&encoded, encoded.bits()).expect("decode")
        });
    });
}

// ---------------------------------------------------------------------------
// Bench: engine cache miss vs hit
// ---------------------------------------------------------------------------

fn bench_engine_cache_miss(c: &mut Criterion) {
    let engine = make_engine();
    let mut salt = 0u64;

    c.bench_function("engine_optimize_miss", |b| {
        b.iter(|| {
            salt += 1;
            engine
                .optimize(black_box(&make_interface(3, salt)))
                .expect("optimize")
        });
    });
}

fn bench_engine_cache_hit(c: &mut Criterion) {
    let engine = make_engine();
    let iface = make_interface(3, 0);
    engine.optimize(&iface).expect("warm");

    c.bench_function("engine_optimize_hit", |b| {
        b.iter(|| engine.optimize(black_box(&iface)).expect("optimize"));
    });
}

fn bench_engine_async_hit(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let engine = make_engine();
    let iface = make_interface(3, 0);
    engine.optimize(&iface).expect("warm");

    c.bench_function("engine_optimize_async_hit", |b| {
        b.to_async(&rt).iter(|| {
            let engine = Arc::clone(&engine);
            let iface = iface.clone();
            async move { engine.optimize_async(iface).await.expect("optimize") }
        });
    });
}

// ---------------------------------------------------------------------------
// Bench: consensus update with a growing store
// ---------------------------------------------------------------------------

fn bench_consensus_update(c: &mut Criterion) {
    let store = ConsensusStore::default();
    let agent = AgentId::new("bench-agent");
    let knowledge = make_interface(8, 3);

    c.bench_function("consensus_update_8_fields", |b| {
        b.iter(|| store.update(&agent, black_box(&knowledge)));
    });
}

criterion_group!(
    pipeline_benches,
    bench_transform_shots,
    bench_codec,
    bench_engine_cache_miss,
    bench_engine_cache_hit,
    bench_engine_async_hit,
    bench_consensus_update,
);
criterion_main!(pipeline_benches);
