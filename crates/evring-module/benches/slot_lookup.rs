//! Slot table and callback-path benchmarks
//!
//! Run: cargo bench -p evring-module

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use evring_core::{BufferKind, SlotId, SlotTable};
use evring_module::bridge::{self, Delivery, Outputs};
use std::sync::Arc;

fn bench_slot_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_table");
    group.throughput(Throughput::Elements(1));

    group.bench_function("lookup", |b| {
        let table: SlotTable<u64> = SlotTable::new(512);
        let ids: Vec<SlotId> = (0..64).map(|i| table.allocate(Arc::new(i)).unwrap()).collect();
        let mut n = 0usize;
        b.iter(|| {
            let v = table.lookup(black_box(ids[n & 63]));
            n = n.wrapping_add(1);
            v
        });
    });

    group.bench_function("allocate_free", |b| {
        let table: SlotTable<u64> = SlotTable::new(512);
        let value = Arc::new(7u64);
        b.iter(|| {
            let id = table.allocate(Arc::clone(&value)).unwrap();
            table.free(black_box(id));
        });
    });

    group.finish();
}

fn bench_ring_callback(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_callback");

    for size in [16usize, 256, 4096] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("record_{}", size), |b| {
            let (tx, rx) = crossbeam_channel::unbounded();
            let delivery = Arc::new(Delivery::new(BufferKind::Ring));
            delivery.arm(Outputs { events: tx, lost: None });
            let slot = bridge::event_slots().allocate(Arc::clone(&delivery)).unwrap();
            let mut payload = vec![0u8; size];

            b.iter(|| {
                unsafe {
                    bridge::ring_sample_cb(
                        slot.as_token(),
                        payload.as_mut_ptr() as *mut libc::c_void,
                        payload.len(),
                    );
                }
                rx.try_recv().ok()
            });

            bridge::event_slots().free(slot);
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slot_table, bench_ring_callback);
criterion_main!(benches);
