//! Micro benchmarks for the incremental checksum math every rewrite path
//! (NAT, IPv6 prefix translation, MSS clamp) depends on. Pure CPU, no IO.
//!
//! ```bash
//! cargo bench --bench bench_checksum
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use flowgate_ebpf_common::checksum::{update_addr128, update_u16, update_u32};

fn bench_update_u16(c: &mut Criterion) {
    c.bench_function("checksum_update_u16_port_rewrite", |b| {
        b.iter(|| update_u16(std::hint::black_box(0x1234), std::hint::black_box(1234), std::hint::black_box(5678)));
    });
}

fn bench_update_u32(c: &mut Criterion) {
    c.bench_function("checksum_update_u32_ipv4_rewrite", |b| {
        b.iter(|| {
            update_u32(std::hint::black_box(0x1234), std::hint::black_box(0x0A000001), std::hint::black_box(0xC0A80001))
        });
    });
}

fn bench_update_addr128(c: &mut Criterion) {
    let old = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
    let new = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
    c.bench_function("checksum_update_addr128_ipv6_prefix_rewrite", |b| {
        b.iter(|| update_addr128(std::hint::black_box(0x1234), std::hint::black_box(&old), std::hint::black_box(&new)));
    });
}

criterion_group!(checksum_benches, bench_update_u16, bench_update_u32, bench_update_addr128);
criterion_main!(checksum_benches);
