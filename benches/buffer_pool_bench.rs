use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use std::sync::Arc;

use cairndb::storage::buffer::BufferPoolManager;

// Create a temporary db for benchmarking
fn create_bench_buffer_pool(pool_size: usize) -> Arc<BufferPoolManager> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, 2, temp_file.path()).unwrap());

    // Keep the temp file alive for the duration of the benchmark
    std::mem::forget(temp_file);

    buffer_pool
}

fn buffer_pool_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferPool");

    for size in [16, 128, 1024].iter() {
        group.bench_with_input(BenchmarkId::new("new_unpin", size), size, |b, &size| {
            let buffer_pool = create_bench_buffer_pool(size);
            b.iter(|| {
                let (page, page_id) = buffer_pool.new_page().unwrap();
                page.write().data[0] = page_id as u8;
                buffer_pool.unpin_page(page_id, true);
            });
        });

        group.bench_with_input(BenchmarkId::new("random_fetch", size), size, |b, &size| {
            let buffer_pool = create_bench_buffer_pool(size);
            // Twice as many pages as frames, so fetches mix hits and misses.
            let mut page_ids = Vec::new();
            for _ in 0..size * 2 {
                let (_, page_id) = buffer_pool.new_page().unwrap();
                buffer_pool.unpin_page(page_id, true);
                page_ids.push(page_id);
            }

            let mut rng = StdRng::seed_from_u64(7);
            b.iter(|| {
                let page_id = *page_ids.choose(&mut rng).unwrap();
                let _page = buffer_pool.fetch_page(page_id).unwrap();
                buffer_pool.unpin_page(page_id, false);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, buffer_pool_benchmark);
criterion_main!(benches);
