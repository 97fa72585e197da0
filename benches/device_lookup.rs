//! Benchmark for disk-proxy device lookup
//!
//! Scans a fleet of disk-proxy StatefulSets for the replica serving a device.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use disk_affinity::cluster::builders::disk_proxy;
use disk_affinity::resolver::{find_disk_proxy, serves_device};

fn device_list(first_id: u64, count: u64) -> String {
    (first_id..first_id + count)
        .map(|id| format!("{} 0000:{:02x}:00.0 nvme{}", id, id % 256, id))
        .collect::<Vec<_>>()
        .join(",")
}

fn bench_serves_device(c: &mut Criterion) {
    let mut group = c.benchmark_group("device_lookup");
    group.throughput(Throughput::Elements(1));

    let annotation = device_list(0, 24);
    group.bench_function("serves_device_last_entry", |b| {
        b.iter(|| serves_device(black_box(&annotation), black_box(23)));
    });

    group.finish();
}

fn bench_find_disk_proxy(c: &mut Criterion) {
    let mut group = c.benchmark_group("device_lookup");

    // 256 proxies, 8 devices each
    let replicas: Vec<_> = (0..256u64)
        .map(|i| {
            disk_proxy(
                &format!("disk-proxy-{}", i),
                "magellan",
                &device_list(i * 8, 8),
                Some(format!("node-{}", i).as_str()),
            )
        })
        .collect();

    group.throughput(Throughput::Elements(replicas.len() as u64));
    group.bench_function("find_disk_proxy_worst_case", |b| {
        b.iter(|| find_disk_proxy(black_box(&replicas), "disks", black_box(255 * 8 + 7)));
    });

    group.finish();
}

criterion_group!(benches, bench_serves_device, bench_find_disk_proxy);
criterion_main!(benches);
