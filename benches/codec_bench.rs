use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use game_protocol::core::buffer::{AccessMode, ByteBuffer};
use game_protocol::core::codec::{ByteOrder, PacketReader, PacketWriter, ValueType};
use game_protocol::core::isaac::{IsaacCipher, NullCipher};
use game_protocol::game::PlayerState;
use game_protocol::protocol::outgoing::{player_update, post_login_burst};
use game_protocol::protocol::{Dispatcher, Packet, PacketDecoder};

#[allow(clippy::unwrap_used)]
fn bench_value_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_codec");
    let orders = [
        ("big", ByteOrder::Big),
        ("little", ByteOrder::Little),
        ("middle", ByteOrder::Middle),
        ("inverse_middle", ByteOrder::InverseMiddle),
    ];

    for (name, order) in orders {
        group.throughput(Throughput::Bytes(4 * 256));
        group.bench_function(format!("write_int_{name}"), |b| {
            b.iter(|| {
                let mut writer = PacketWriter::new(4 * 256);
                for value in 0..256 {
                    writer.write_int(value * 7919, ValueType::A, order).unwrap();
                }
                writer
            })
        });

        let mut writer = PacketWriter::new(4 * 256);
        for value in 0..256 {
            writer.write_int(value * 7919, ValueType::A, order).unwrap();
        }
        let encoded = writer.as_bytes().to_vec();
        group.bench_function(format!("read_int_{name}"), |b| {
            b.iter_batched(
                || ByteBuffer::from_bytes(&encoded),
                |mut buffer| {
                    let mut reader = PacketReader::new(&mut buffer);
                    for _ in 0..256 {
                        reader.read_int(ValueType::A, order).unwrap();
                    }
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_bit_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("bit_access");
    let widths = [1u32, 5, 11, 32];

    for width in widths {
        group.bench_function(format!("write_{width}_bit_fields"), |b| {
            b.iter(|| {
                let mut buffer = ByteBuffer::new(0);
                buffer.set_access_mode(AccessMode::Bit);
                for value in 0..512u32 {
                    buffer.write_bits(width, value).unwrap();
                }
                buffer
            })
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_packet_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_decode");
    let seed = [0x1122_3344, 0x5566_7788, 0x99aa_bbcc, 0xddee_ff00];
    let dispatcher: Dispatcher<usize> = Dispatcher::new();
    dispatcher
        .register(185, |count: &mut usize, _: &mut Packet| {
            *count += 1;
            Ok(())
        })
        .unwrap();

    for packets in [16usize, 256, 4096] {
        let mut cipher = IsaacCipher::new(&seed);
        let mut stream = Vec::with_capacity(packets * 3);
        for i in 0..packets {
            stream.push(185u8.wrapping_add(cipher.next_word() as u8));
            stream.extend_from_slice(&(i as u16).to_be_bytes());
        }

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_function(format!("drain_{packets}_buttons"), |b| {
            b.iter_batched(
                || (ByteBuffer::from_bytes(&stream), IsaacCipher::new(&seed)),
                |(mut inbound, mut cipher)| {
                    let mut decoder = PacketDecoder::default();
                    let mut count = 0usize;
                    dispatcher
                        .drain(&mut decoder, &mut inbound, &mut cipher, &mut count)
                        .unwrap();
                    assert_eq!(count, packets);
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_outgoing(c: &mut Criterion) {
    let mut group = c.benchmark_group("outgoing");
    let player = PlayerState::new(1, "bench");

    group.bench_function("player_update", |b| {
        b.iter(|| player_update(&mut NullCipher, &player).unwrap())
    });
    group.bench_function("post_login_burst", |b| {
        b.iter(|| post_login_burst(&mut NullCipher, &player).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_value_codec,
    bench_bit_access,
    bench_packet_decode,
    bench_outgoing
);
criterion_main!(benches);
