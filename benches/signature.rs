//! Performance benchmarks for signature encoding and pack digests.
//!
//! Run with: `cargo bench --bench signature`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | P001 signature + instance id | <5µs | One duplicate group |
//! | Dimension signature | Linear in members | Sorted pairs |
//! | Pack digest | Linear in entries | Sort dominates |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use xew_evidence_kernel::canonical::{dimension_signature, p001_signature};
use xew_evidence_kernel::pack::compute_pack_sha256;
use xew_evidence_kernel::types::{DimensionMember, DimensionValue, QName};
use xew_evidence_kernel::{instance_id, sha256_hex};

fn dimensions(n: usize) -> Vec<DimensionValue> {
    (0..n)
        .rev()
        .map(|i| DimensionValue {
            dimension: QName::new("http://acme.com/20240630", format!("SegmentAxis{i}")),
            member: DimensionMember::Explicit(QName::new("http://acme.com/20240630", format!("Member{i}"))),
        })
        .collect()
}

/// Benchmark encoding one P001 signature and hashing it to an instance id.
fn bench_p001_instance_id(c: &mut Criterion) {
    c.bench_function("p001_signature_and_instance_id", |b| {
        b.iter(|| {
            let sig = p001_signature(
                black_box("{http://fasb.org/us-gaap/2024}Revenues"),
                "http://www.sec.gov/CIK",
                "0000123456",
                "duration:2023-07-01..2024-06-30",
                "",
                "{http://www.xbrl.org/2003/iso4217}USD",
            )
            .unwrap();
            instance_id(&sig)
        })
    });
}

/// Benchmark dimension signatures by member count.
fn bench_dimension_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("dimension_signature");
    for n in [1usize, 4, 16, 64] {
        let dims = dimensions(n);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &dims, |b, dims| {
            b.iter(|| dimension_signature(black_box(dims)))
        });
    }
    group.finish();
}

/// Benchmark pack digests by manifest size.
fn bench_pack_sha256(c: &mut Criterion) {
    let mut group = c.benchmark_group("pack_sha256");
    for n in [10usize, 100, 1000] {
        let entries: Vec<(String, String)> = (0..n)
            .rev()
            .map(|i| (format!("artifacts/R{i}.htm"), sha256_hex(i.to_string().as_bytes())))
            .collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &entries, |b, entries| {
            b.iter(|| compute_pack_sha256(black_box(entries).iter().map(|(p, s)| (p.as_str(), s.as_str()))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_p001_instance_id, bench_dimension_signature, bench_pack_sha256);
criterion_main!(benches);
