//! Benchmarks for flightfs chunked transfers

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flightfs::medium::SimMedium;
use flightfs::rt::ManualRealTime;
use flightfs::{Backend, Config, FatBackend, MemoryArchive, OpenFlags, RomfsBackend, Whence};

const SIZES: [usize; 3] = [512, 16 * 1024, 256 * 1024];

fn fat_backend(dma_safe: bool) -> FatBackend<SimMedium> {
    let medium = SimMedium::new();
    medium.control().set_dma_safe(dma_safe);
    FatBackend::new(medium, Arc::new(ManualRealTime::new()), Config::default())
}

fn fat_write_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fat_write");
    for size in SIZES {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        for (label, dma_safe) in [("direct", true), ("chunked", false)] {
            let backend = fat_backend(dma_safe);
            let flags = OpenFlags::WRONLY | OpenFlags::CREAT | OpenFlags::TRUNC;
            let fd = backend.open("/bench.bin", flags).unwrap();
            group.bench_with_input(BenchmarkId::new(label, size), &payload, |b, payload| {
                b.iter(|| {
                    backend.lseek(fd, 0, Whence::Set).unwrap();
                    backend.write(fd, payload).unwrap()
                })
            });
            backend.close(fd).unwrap();
        }
    }
    group.finish();
}

fn fat_read_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("fat_read");
    for size in SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        for (label, dma_safe) in [("direct", true), ("chunked", false)] {
            let medium = SimMedium::new().with_file("/bench.bin", &vec![0x5Au8; size]);
            medium.control().set_dma_safe(dma_safe);
            let backend =
                FatBackend::new(medium, Arc::new(ManualRealTime::new()), Config::default());
            let fd = backend.open("/bench.bin", OpenFlags::RDONLY).unwrap();
            let mut buf = vec![0u8; size];
            group.bench_function(BenchmarkId::new(label, size), |b| {
                b.iter(|| {
                    backend.lseek(fd, 0, Whence::Set).unwrap();
                    backend.read(fd, &mut buf).unwrap()
                })
            });
            backend.close(fd).unwrap();
        }
    }
    group.finish();
}

fn romfs_benchmarks(c: &mut Criterion) {
    let archive = MemoryArchive::builder()
        .file("scripts/mission.lua", vec![b'x'; 64 * 1024])
        .build();
    let backend = RomfsBackend::new(archive, &Config::default());

    c.bench_function("romfs_load_file", |b| {
        b.iter(|| backend.load_file("scripts/mission.lua").unwrap())
    });
}

criterion_group!(
    benches,
    fat_write_benchmarks,
    fat_read_benchmarks,
    romfs_benchmarks
);
criterion_main!(benches);
