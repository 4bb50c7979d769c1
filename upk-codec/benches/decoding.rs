use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use upk_codec::{
    decompress_big_block, BigBlockBuilder, Codec, Limits, ModernPropertyDecoder, NameTable,
    SliceReader,
};

const NAMES: [&str; 5] = ["None", "Value", "IntProperty", "ArrayProperty", "FloatProperty"];

fn modern_list(properties: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..properties {
        if i % 2 == 0 {
            for word in [1i64, 2, 4] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            out.extend_from_slice(&(i as i32).to_le_bytes());
        } else {
            let count = 16u32;
            let len = 8 + 4 + 4 * count as i64;
            for word in [1i64, 3, len, 4] {
                out.extend_from_slice(&word.to_le_bytes());
            }
            out.extend_from_slice(&count.to_le_bytes());
            for j in 0..count {
                out.extend_from_slice(&(j as f32).to_le_bytes());
            }
        }
    }
    out.extend_from_slice(&0i64.to_le_bytes());
    out
}

fn bench_modern_properties(c: &mut Criterion) {
    let names = NameTable::from_names(NAMES);
    let limits = Limits::default();
    let mut group = c.benchmark_group("modern_properties");

    for count in [16usize, 256, 4096] {
        let data = modern_list(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &data, |b, data| {
            b.iter(|| {
                let decoder = ModernPropertyDecoder::new(&names, &limits);
                let mut reader = SliceReader::new(black_box(data));
                let mut props = Vec::with_capacity(count);
                decoder.decode_properties(&mut reader, &mut props).unwrap();
                props
            })
        });
    }

    group.finish();
}

fn bench_big_block(c: &mut Criterion) {
    let data: Vec<u8> = (0..1_048_576u32).map(|i| (i / 64 % 251) as u8).collect();
    let block = BigBlockBuilder::new(Codec::Deflate).build(&data).unwrap();
    let limits = Limits::default();

    c.bench_function("big_block_deflate_1mib", |b| {
        b.iter(|| {
            let mut reader = SliceReader::new(black_box(&block));
            decompress_big_block(&mut reader, &limits).unwrap()
        })
    });
}

criterion_group!(benches, bench_modern_properties, bench_big_block);
criterion_main!(benches);
