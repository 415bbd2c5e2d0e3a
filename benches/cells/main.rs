use std::time::Duration;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BatchSize;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::Throughput;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tessera::prelude::*;

pub fn cells_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("cells");
    group
        .noise_threshold(0.05)
        .measurement_time(Duration::from_secs(20))
        .sample_size(10);
    for num_particles in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(num_particles as u64));
        group.bench_function(BenchmarkId::from_parameter(num_particles), |b| {
            b.iter_batched(
                || setup_container(num_particles),
                compute_all_cells,
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, cells_benchmark);
criterion_main!(benches);

fn compute_all_cells(container: Container) {
    container.compute_all_cells();
}

fn setup_container(num_particles: usize) -> Container {
    let mut rng = StdRng::seed_from_u64(1338);
    let domain = DomainBox::new(Extent::cube_from_side_length(1.0), [false; 3]);
    let blocks = ((num_particles as f64 / 5.6).cbrt() + 1.0) as usize;
    let mut container = Container::new(domain, (blocks, blocks, blocks), 8, false);
    let particles: Vec<Particle> = (0..num_particles)
        .map(|i| {
            Particle::new(
                i as i64,
                Point3d::new(
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                    rng.gen_range(0.0..1.0),
                ),
            )
        })
        .collect();
    container.par_put_all(&particles);
    container.reconcile_overflow();
    container
}
