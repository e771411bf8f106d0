use criterion::{Criterion, criterion_group, criterion_main};
use factory_brain::embeddings::{ChunkingConfig, TextChunker};
use std::hint::black_box;

fn maintenance_manual() -> String {
    let section = "Servo alarm AL.020: encoder communication error. Check the encoder cable for \
                   damage, reseat the connector and verify the shield is grounded.\n\
                   If the alarm persists, replace the encoder battery; voltage below 3.0 V \
                   causes position loss after power-off.\n\n\
                   伺服报警后请先断电，检查编码器线缆，然后重新上电。\n\n";
    section.repeat(200)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let manual = maintenance_manual();
    let chunker = TextChunker::new(&ChunkingConfig::default()).expect("default config is valid");
    c.bench_function("chunking", |b| {
        b.iter(|| chunker.split_text(black_box(&manual)))
    });

    let small = TextChunker::new(&ChunkingConfig {
        chunk_size: 64,
        chunk_overlap: 8,
    })
    .expect("small config is valid");
    c.bench_function("chunking_small_windows", |b| {
        b.iter(|| small.chunks(black_box(&manual)).count())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
