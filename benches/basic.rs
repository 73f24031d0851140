use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serial_stream::format::{format_duration, parse_config};
use serial_stream::resolve::{resolve_comm, resolve_posix};
use serial_stream::PortConfig;
use std::time::Duration;

pub fn bench_config_parsing(c: &mut Criterion) {
    let sample = "/dev/serial/by-id/usb-FTDI:115200,8-N-1,1.5s";
    c.bench_function("parse_config", |b| {
        b.iter(|| {
            let config = parse_config(black_box(sample)).unwrap();
            black_box(config);
        })
    });

    c.bench_function("format_duration", |b| {
        b.iter(|| black_box(format_duration(black_box(Duration::from_micros(1_500_250)))))
    });
}

pub fn bench_resolution(c: &mut Criterion) {
    let config = PortConfig::new("/dev/ttyUSB0", 115200).read_timeout(Duration::from_millis(500));
    c.bench_function("resolve_posix", |b| {
        b.iter(|| black_box(resolve_posix(black_box(&config), true).unwrap()))
    });
    c.bench_function("resolve_comm", |b| {
        b.iter(|| black_box(resolve_comm(black_box(&config)).unwrap()))
    });
}

criterion_group!{
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_config_parsing, bench_resolution
}
criterion_main!(benches);
