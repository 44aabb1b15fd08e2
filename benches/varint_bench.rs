use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use packet_intercept::core::buffer::ByteBuf;
use packet_intercept::core::varint::{read_var_int, var_int_len, write_var_int};
use packet_intercept::core::wrapper::PacketWrapper;
use packet_intercept::protocol::version::{ClientVersion, ProtocolVersion};

#[allow(clippy::unwrap_used)]
fn bench_var_int_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("var_int_codec");
    // one representative value per encoded width
    let values = [0x25i32, 0x1ED3, 0x1F_FFFF, 0x0FFF_FFFF, -1];

    for &value in &values {
        let width = var_int_len(value);
        group.throughput(Throughput::Bytes(width as u64));
        group.bench_function(format!("encode_{width}b"), |b| {
            b.iter_batched(
                ByteBuf::new,
                |buffer| write_var_int(&buffer, value).unwrap(),
                BatchSize::SmallInput,
            )
        });
        group.bench_function(format!("decode_{width}b"), |b| {
            let buffer = ByteBuf::new();
            write_var_int(&buffer, value).unwrap();
            // padding so the fast path always sees four readable bytes
            buffer.write_bytes(&[0u8; 8]).unwrap();
            b.iter(|| {
                buffer.set_reader_index(0).unwrap();
                read_var_int(&buffer).unwrap()
            })
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_var_int_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("var_int_stream");
    let counts = [64usize, 1024, 16384];

    for &count in &counts {
        let buffer = ByteBuf::new();
        for i in 0..count {
            write_var_int(&buffer, (i as i32).wrapping_mul(2654435761u32 as i32)).unwrap();
        }
        let total = buffer.readable_bytes().unwrap();
        group.throughput(Throughput::Bytes(total as u64));
        group.bench_function(format!("decode_{count}_values"), |b| {
            b.iter(|| {
                buffer.set_reader_index(0).unwrap();
                for _ in 0..count {
                    read_var_int(&buffer).unwrap();
                }
            })
        });
    }
    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_wrapper_fields(c: &mut Criterion) {
    let mut group = c.benchmark_group("wrapper_fields");

    group.bench_function("string_roundtrip_64", |b| {
        let text = "x".repeat(64);
        b.iter_batched(
            ByteBuf::new,
            |buffer| {
                let mut wrapper = PacketWrapper::for_decode(
                    buffer,
                    ProtocolVersion::latest(),
                    ClientVersion::UNKNOWN,
                    0,
                );
                wrapper.write_string(&text, 128).unwrap();
                wrapper.read_string(128).unwrap()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_var_int_codec,
    bench_var_int_stream,
    bench_wrapper_fields
);
criterion_main!(benches);
