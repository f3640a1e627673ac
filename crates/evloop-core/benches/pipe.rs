use criterion::{black_box, criterion_group, criterion_main, Criterion};
use evloop_core::BytePipe;

fn bench_write_read(c: &mut Criterion) {
    let payload = vec![0x5au8; 4096];
    let mut out = vec![0u8; 4096];

    c.bench_function("pipe_write_read_4k", |b| {
        let mut pipe = BytePipe::new();
        b.iter(|| {
            pipe.write(black_box(&payload)).unwrap();
            black_box(pipe.read(&mut out));
        });
    });
}

fn bench_write_head_requeue(c: &mut Criterion) {
    let payload = vec![0x5au8; 1024];
    let mut chunk = vec![0u8; 1024];

    c.bench_function("pipe_requeue_1k", |b| {
        let mut pipe = BytePipe::new();
        pipe.write(&payload).unwrap();
        b.iter(|| {
            let n = pipe.read(&mut chunk);
            pipe.write_head(black_box(&chunk[..n])).unwrap();
        });
    });
}

fn bench_find_byte(c: &mut Criterion) {
    let mut pipe = BytePipe::new();
    pipe.write(&vec![b'a'; 4095]).unwrap();
    pipe.write(b"\n").unwrap();

    c.bench_function("pipe_find_newline_4k", |b| {
        b.iter(|| black_box(pipe.find_byte(b'\n')));
    });
}

criterion_group!(benches, bench_write_read, bench_write_head_requeue, bench_find_byte);
criterion_main!(benches);
