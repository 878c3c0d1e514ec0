//! Buddy pool benchmarks.

use std::ffi::c_void;
use std::hint::black_box;

use buddypool_abi::{buddy_destroy, buddy_free, buddy_init, buddy_malloc, buddy_pool};
use buddypool_core::{BuddyPool, MIN_K, PoolConfig};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

const POOL_ORDER: usize = MIN_K + 4;

fn pool() -> BuddyPool {
    BuddyPool::with_config(PoolConfig::fixed(1 << POOL_ORDER)).expect("map pool")
}

fn bench_alloc_free_cycle(c: &mut Criterion) {
    let sizes: &[usize] = &[16, 64, 256, 1024, 4096, 32768];
    let mut group = c.benchmark_group("alloc_free_cycle");

    for &size in sizes {
        group.bench_with_input(BenchmarkId::new("buddy", size), &size, |b, &sz| {
            let mut pool = pool();
            b.iter(|| {
                let ptr = pool.allocate(black_box(sz)).expect("room");
                unsafe { pool.release(ptr.as_ptr()) };
            });
        });
        group.bench_with_input(BenchmarkId::new("libc", size), &size, |b, &sz| {
            b.iter(|| unsafe {
                let ptr = libc::malloc(black_box(sz));
                libc::free(black_box(ptr));
            });
        });
    }
    group.finish();
}

// Pre-fragmented pool: every other smallest block held, so releases cannot
// merge past the first level.
fn bench_fragmented_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragmented_cycle");
    group.bench_function("64B_with_checkerboard", |b| {
        let mut pool = pool();
        let mut held = Vec::new();
        let mut spare = Vec::new();
        for i in 0..4096 {
            let ptr = pool.allocate(1).expect("room");
            if i % 2 == 0 {
                held.push(ptr);
            } else {
                spare.push(ptr);
            }
        }
        for ptr in spare {
            unsafe { pool.release(ptr.as_ptr()) };
        }
        b.iter(|| {
            let ptr = pool.allocate(black_box(1)).expect("room");
            unsafe { pool.release(ptr.as_ptr()) };
        });
        black_box(held);
    });
    group.finish();
}

fn bench_alloc_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_burst");

    group.bench_function("1000x64B", |b| {
        let mut pool = pool();
        let mut ptrs = Vec::with_capacity(1000);
        b.iter(|| {
            for _ in 0..1000 {
                ptrs.push(pool.allocate(64).expect("room"));
            }
            for ptr in ptrs.drain(..).rev() {
                unsafe { pool.release(ptr.as_ptr()) };
            }
        });
    });

    group.finish();
}

fn bench_c_abi(c: &mut Criterion) {
    let mut group = c.benchmark_group("c_abi");
    group.bench_function("buddy_malloc_free_256B", |b| {
        let mut desc = buddy_pool::zeroed();
        unsafe { buddy_init(&mut desc, 1 << POOL_ORDER) };
        b.iter(|| unsafe {
            let ptr: *mut c_void = buddy_malloc(&mut desc, black_box(256));
            buddy_free(&mut desc, ptr);
        });
        unsafe { buddy_destroy(&mut desc) };
    });
    group.finish();
}

fn bench_init_destroy(c: &mut Criterion) {
    let mut group = c.benchmark_group("init_destroy");
    for order in [MIN_K, MIN_K + 4, MIN_K + 8] {
        group.bench_with_input(BenchmarkId::from_parameter(order), &order, |b, &k| {
            b.iter(|| {
                let pool = BuddyPool::with_config(PoolConfig::fixed(1 << k)).expect("map");
                pool.destroy().expect("unmap");
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_alloc_free_cycle,
    bench_fragmented_cycle,
    bench_alloc_burst,
    bench_c_abi,
    bench_init_destroy
);
criterion_main!(benches);
