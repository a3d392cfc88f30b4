//! # Flo-Index Benchmarks
//!
//! | Crate | Path | Expectation |
//! |-------|------|-------------|
//! | fi-01 Chain Sync | ring buffer push, window push | O(1) per header |
//! | fi-03 Multipart | chain planning | linear in payload size |
//! | fi-03 Multipart | grouping and assembly | linear in fragment count |

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fi_01_chain_sync::{mock_block, BlockRingBuffer, RecentBlockWindow, DEFAULT_WINDOW_SLOTS};
use fi_03_multipart::domain::reassembly::group_fragments;
use fi_03_multipart::{assemble, plan_chain, FragmentLayout, SplitterConfig, DEFAULT_DATA_LIMIT};
use shared_types::{BlockHeader, FragmentRecord};

/// Deterministic bytes that compress poorly.
fn noisy_payload(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) as u8
        })
        .collect()
}

fn layout() -> FragmentLayout {
    FragmentLayout {
        address_len: 34,
        signature_len: 88,
    }
}

// ============================================================================
// FI-01: Chain Sync
// ============================================================================

fn bench_recent_blocks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fi-01-recent-blocks");

    group.bench_function("ring_buffer_push_wrapping", |b| {
        let mut buffer = BlockRingBuffer::with_slots(DEFAULT_WINDOW_SLOTS).unwrap();
        let mut n = 0u64;
        b.iter(|| {
            buffer.push(black_box(n));
            n += 1;
        })
    });

    let headers: Vec<BlockHeader> = (0..1_000).map(|h| mock_block(h, 0, 0, &[]).header()).collect();
    group.throughput(Throughput::Elements(headers.len() as u64));
    group.bench_function("window_push_1000", |b| {
        b.iter(|| {
            let mut window = RecentBlockWindow::new(DEFAULT_WINDOW_SLOTS).unwrap();
            for header in &headers {
                window.push(header.clone()).unwrap();
            }
            black_box(window.tip().map(|t| t.height))
        })
    });

    group.finish();
}

// ============================================================================
// FI-03: Multipart Splitting
// ============================================================================

fn bench_plan_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fi-03-plan-chain");
    group.measurement_time(Duration::from_secs(10));
    let config = SplitterConfig::for_testing();

    for multiple in [2usize, 10, 100] {
        let payload = noisy_payload(DEFAULT_DATA_LIMIT * multiple, multiple as u64);
        group.throughput(Throughput::Bytes(payload.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("noisy", multiple),
            &payload,
            |b, payload| b.iter(|| black_box(plan_chain(payload, &layout(), &config).unwrap())),
        );
    }

    let text = "a fairly repetitive line of text\n".repeat(2_000).into_bytes();
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("compressible_text", |b| {
        b.iter(|| black_box(plan_chain(&text, &layout(), &config).unwrap()))
    });

    group.finish();
}

// ============================================================================
// FI-03: Multipart Reassembly
// ============================================================================

fn fragment_records(payload: &[u8]) -> Vec<FragmentRecord> {
    let plan = plan_chain(payload, &layout(), &SplitterConfig::for_testing()).unwrap();
    let reference = format!("{:010x}", 1);
    plan.parts
        .iter()
        .map(|part| FragmentRecord {
            reference: reference.clone(),
            part: part.part,
            max: plan.max,
            chunk: part.chunk.clone(),
            address: "F".repeat(34),
            signature: String::new(),
            txid: format!("{:064x}", part.part + 1),
            block: None,
            time: 1_600_000_000 + u64::from(part.part),
            complete: false,
            stale: false,
            assembled: None,
        })
        .collect()
}

fn bench_reassembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("fi-03-reassembly");

    for multiple in [10usize, 100] {
        let records = fragment_records(&noisy_payload(DEFAULT_DATA_LIMIT * multiple, 7));
        group.throughput(Throughput::Elements(records.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("group_and_assemble", multiple),
            &records,
            |b, records| {
                b.iter(|| {
                    let grouping = group_fragments(records.clone(), 4);
                    let assembled = assemble(&grouping.groups[0]).unwrap();
                    black_box(assembled.map(|m| m.payload.len()))
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(50);
    targets = bench_recent_blocks, bench_plan_chain, bench_reassembly
);
criterion_main!(benches);
