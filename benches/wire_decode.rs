use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use apiscope::wire::{decode, encode, WireField, WireValue};

fn payload(fields: usize) -> Vec<u8> {
    let inner = encode(&[
        WireField::new(1, WireValue::Varint(42)),
        WireField::new(2, WireValue::Text("nested".to_string())),
    ])
    .unwrap_or_default();

    let mut message = Vec::with_capacity(fields);
    for i in 0..fields {
        let number = (i % 15) as u32 + 1;
        let value = match i % 4 {
            0 => WireValue::Varint(i as u64 * 1_000),
            1 => WireValue::Text(format!("value-{i}")),
            2 => WireValue::Fixed32(i as u32),
            _ => WireValue::Message(inner.clone().into()),
        };
        message.push(WireField::new(number, value));
    }
    encode(&message).unwrap_or_default()
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_decode");

    for fields in [10, 100, 1_000] {
        let bytes = payload(fields);
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(fields), &bytes, |b, bytes| {
            b.iter(|| decode(black_box(bytes)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode);
criterion_main!(benches);
