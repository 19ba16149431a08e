use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tybr_codec::value::{ObjectValue, Value};
use tybr_codec::{Codec, CodecOpts};

fn create_record_graph(count: usize) -> Value {
    let levels = ["info", "warn", "error"];
    let rows: Vec<Value> = (0..count)
        .map(|i| {
            let mut row = ObjectValue::default();
            row.set("identifier", Value::Number(i as f64));
            row.set("user", Value::string(&format!("user{}", i % 100)));
            row.set("timestamp", Value::Number(1_600_000_000.0 + i as f64));
            row.set("level", Value::string(levels[i % 3]));
            Value::object(row)
        })
        .collect();
    Value::array(rows)
}

fn create_numeric_array(count: usize) -> Value {
    Value::array((0..count).map(|i| Value::Number((i % 100) as f64)).collect())
}

fn bench_record_graphs(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_graphs");

    for count in [100, 1000, 10000] {
        let graph = create_record_graph(count);
        let codec = Codec::default();
        let bytes = codec.serialize(&graph).unwrap();

        group.bench_with_input(
            BenchmarkId::new("serialize", count),
            &graph,
            |b, graph| {
                b.iter(|| black_box(codec.serialize(black_box(graph)).unwrap()));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("deserialize", count),
            &bytes,
            |b, bytes| {
                b.iter(|| black_box(codec.deserialize(black_box(bytes)).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_packed_arrays(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed_arrays");

    let graph = create_numeric_array(65536);
    let packed = Codec::default();
    let dense = Codec::new(CodecOpts {
        packed_arrays: false,
        ..CodecOpts::default()
    });

    group.bench_function("serialize_packed", |b| {
        b.iter(|| black_box(packed.serialize(black_box(&graph)).unwrap()));
    });
    group.bench_function("serialize_dense", |b| {
        b.iter(|| black_box(dense.serialize(black_box(&graph)).unwrap()));
    });

    let bytes = packed.serialize(&graph).unwrap();
    group.bench_function("deserialize_packed", |b| {
        b.iter(|| black_box(packed.deserialize(black_box(&bytes)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_record_graphs, bench_packed_arrays);
criterion_main!(benches);
