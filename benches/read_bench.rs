use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::fs::File;
use std::io::Read;
use tempfile::NamedTempFile;
use zipcore::{archive::close_entry_read, Archive, EntryDescriptor};

fn generate_compressible_data(size: usize) -> Vec<u8> {
    let pattern = b"The quick brown fox jumps over the lazy dog. ";
    let mut data = Vec::with_capacity(size);
    while data.len() < size {
        data.extend_from_slice(pattern);
    }
    data.truncate(size);
    data
}

fn generate_random_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state = 0x12345678u32;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

fn create_test_zip_deflate(data: &[u8], level: u32) -> NamedTempFile {
    let temp = NamedTempFile::new().unwrap();
    let file = File::create(temp.path()).unwrap();
    let mut archive = Archive::create(file);
    let mut entry = EntryDescriptor::default();
    entry.filename = "test.bin".to_string();
    archive.start_entry(entry, level, None).unwrap();
    archive.write_entry_data(data).unwrap();
    archive.finish().unwrap();
    temp
}

fn read_all_entries(path: &std::path::Path) {
    let file = File::open(path).unwrap();
    let mut archive = Archive::open_read(file).unwrap();
    let mut buf = Vec::new();
    while archive.goto_next_entry().is_some() {
        let (entry, mut reader) = archive.open_current_entry(None).unwrap();
        reader.read_to_end(black_box(&mut buf)).unwrap();
        close_entry_read(&entry, reader, false).unwrap();
        buf.clear();
    }
}

fn bench_read_compressible_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024, 10 * 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_compressible_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_compressible_data(size);
        let zip_deflate = create_test_zip_deflate(&data, 6);
        group.bench_function(BenchmarkId::new("deflate_level_6", size), |b| {
            b.iter(|| read_all_entries(zip_deflate.path()));
        });

        group.finish();
    }
}

fn bench_read_random_data(c: &mut Criterion) {
    let sizes = vec![100 * 1024, 1024 * 1024];

    for size in sizes {
        let mut group = c.benchmark_group(format!("read_random_{}", format_size(size)));
        group.throughput(Throughput::Bytes(size as u64));

        let data = generate_random_data(size);
        let zip_deflate = create_test_zip_deflate(&data, 6);
        group.bench_function(BenchmarkId::new("deflate_level_6", size), |b| {
            b.iter(|| read_all_entries(zip_deflate.path()));
        });

        group.finish();
    }
}

fn bench_read_multiple_entries(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_multiple_entries");

    let entry_count = 100;
    let entry_size = 10 * 1024;
    group.throughput(Throughput::Bytes((entry_count * entry_size) as u64));

    let data = generate_compressible_data(entry_size);

    let temp_deflate = NamedTempFile::new().unwrap();
    let file = File::create(temp_deflate.path()).unwrap();
    let mut archive = Archive::create(file);
    for i in 0..entry_count {
        let mut entry = EntryDescriptor::default();
        entry.filename = format!("file_{}.txt", i);
        archive.start_entry(entry, 6, None).unwrap();
        archive.write_entry_data(&data).unwrap();
    }
    archive.finish().unwrap();

    group.bench_function("deflate_100_entries", |b| {
        b.iter(|| read_all_entries(temp_deflate.path()));
    });

    group.finish();
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{}B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{}KB", bytes / 1024)
    } else {
        format!("{}MB", bytes / (1024 * 1024))
    }
}

criterion_group!(
    benches,
    bench_read_compressible_data,
    bench_read_random_data,
    bench_read_multiple_entries
);
criterion_main!(benches);
