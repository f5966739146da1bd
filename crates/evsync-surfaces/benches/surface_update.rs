// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-event surface update cost
//!
//! Compares decay policies and kernel sizes on a 640x480 grid

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use evsync_structures::{Event, Stamp};
use evsync_surfaces::{DecayPolicyKind, DecayingSurface, FixedWindow, WindowBound};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WIDTH: usize = 640;
const HEIGHT: usize = 480;

/// Pseudo-random events spread over the sensor
fn generate_events(count: usize) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(0x9e37_79b9);
    (0..count)
        .map(|i| {
            let x = rng.gen_range(0..WIDTH as u16);
            let y = rng.gen_range(0..HEIGHT as u16);
            Event::new(x, y, 0, rng.gen_bool(0.5), Stamp::new(i as u32 * 4))
        })
        .collect()
}

fn bench_policies(c: &mut Criterion) {
    let events = generate_events(100_000);
    let mut group = c.benchmark_group("surface_update");
    group.sample_size(20);
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_secs(2));

    for kind in DecayPolicyKind::ALL {
        for kernel in [3usize, 7] {
            let mut surface = match DecayingSurface::with_kind(
                WIDTH,
                HEIGHT,
                kernel,
                kind,
                kind.default_parameter(),
            ) {
                Ok(s) => s,
                Err(e) => panic!("surface construction failed: {}", e),
            };
            group.bench_with_input(
                BenchmarkId::new(kind.name(), kernel),
                &kernel,
                |b, _| {
                    b.iter(|| {
                        for ev in &events {
                            black_box(surface.apply(ev));
                        }
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let events = generate_events(100_000);
    let mut group = c.benchmark_group("fixed_window");
    group.sample_size(20);

    for size in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("count", size), &size, |b, &size| {
            b.iter(|| {
                let mut window = match FixedWindow::new(WindowBound::Count(size)) {
                    Ok(w) => w,
                    Err(e) => panic!("window construction failed: {}", e),
                };
                window.extend(events.iter().copied());
                black_box(window.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_policies, bench_window);
criterion_main!(benches);
