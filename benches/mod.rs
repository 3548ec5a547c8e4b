use criterion::{criterion_group, criterion_main};


use book::register_benchmarks as register_book_benchmarks;
use store::register_benchmarks as register_store_benchmarks;

// Define the benchmark groups
criterion_group!(benches, register_book_benchmarks, register_store_benchmarks);

criterion_main!(benches);
