use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use game_protocol::core::isaac::{CipherPair, IsaacCipher, OpcodeCipher};

fn bench_keystream(c: &mut Criterion) {
    let mut group = c.benchmark_group("isaac_keystream");
    let seed = [0xdead_beef, 0x0bad_f00d, 0x1234_5678, 0x9abc_def0];

    for words in [1usize, 256, 4096] {
        group.throughput(Throughput::Bytes((words * 4) as u64));
        group.bench_function(format!("next_word_x{words}"), |b| {
            b.iter_batched(
                || IsaacCipher::new(&seed),
                |mut cipher| {
                    let mut acc = 0u32;
                    for _ in 0..words {
                        acc ^= cipher.next_word();
                    }
                    acc
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_session_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("isaac_setup");

    group.bench_function("cipher_pair_from_keys", |b| {
        b.iter(|| {
            let mut pair = CipherPair::from_session_keys(0x0102_0304_0506_0708, 0x1112_1314_1516_1718);
            pair.decrypt.next_key() ^ pair.encrypt.next_key()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_keystream, bench_session_setup);
criterion_main!(benches);
