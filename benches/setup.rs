//! Benchmarks for CPU-side scheduler setup and uniform packing.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use texsched::{
    ComputeScheduler, CustomUniforms, SeedTexture, UniformValue, Vec2, Vec3, Vec4, VariableConfig,
};

const UPDATE: &str = r#"
fn update(coord: vec2<f32>) -> vec4<f32> {
    return vec4<f32>(coord, 0.0, 1.0);
}
"#;

fn bench_uniform_packing(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniform_packing");

    group.bench_function("scalar", |b| {
        let value = UniformValue::from(1.5f32);
        let mut buf = Vec::with_capacity(64);
        b.iter(|| {
            buf.clear();
            value.write_bytes(&mut buf);
            black_box(buf.len())
        })
    });

    group.bench_function("vec4", |b| {
        let value = UniformValue::from(Vec4::new(1.0, 2.0, 3.0, 4.0));
        let mut buf = Vec::with_capacity(64);
        b.iter(|| {
            buf.clear();
            value.write_bytes(&mut buf);
            black_box(buf.len())
        })
    });

    group.bench_function("mixed_set", |b| {
        b.iter(|| {
            let mut uniforms = CustomUniforms::new();
            uniforms.set("time", 0.25f32);
            uniforms.set("speed", 1.5f32);
            uniforms.set("origin", Vec2::new(0.5, 0.5));
            uniforms.set("tint", Vec3::new(1.0, 0.8, 0.2));
            uniforms.set("bounds", Vec4::splat(1.0));
            black_box(uniforms.len())
        })
    });

    group.finish();
}

fn bench_seed_textures(c: &mut Criterion) {
    let mut group = c.benchmark_group("seed_textures");

    for side in [32u32, 128, 512] {
        group.bench_with_input(BenchmarkId::new("from_fn", side), &side, |b, &side| {
            b.iter(|| {
                black_box(SeedTexture::from_fn(side, side, |x, y| {
                    [x as f32, y as f32, 0.0, 1.0]
                }))
            })
        });

        group.bench_with_input(BenchmarkId::new("zeros", side), &side, |b, &side| {
            b.iter(|| black_box(SeedTexture::zeros(side, side)))
        });
    }

    group.finish();
}

fn bench_scheduler_setup(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler_setup");

    for count in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("variables", count), &count, |b, &count| {
            let names: Vec<String> = (0..count).map(|i| format!("state{}", i)).collect();
            b.iter(|| {
                let mut scheduler = ComputeScheduler::new(64, 64);
                let mut handles = Vec::with_capacity(count);
                for name in &names {
                    let config = VariableConfig::new(UPDATE)
                        .with_uniform("time", 0.0f32)
                        .with_uniform("scale", 1.0f32);
                    let seed = scheduler.create_zero_texture();
                    handles.push(scheduler.add_variable(name, config, seed).unwrap());
                }
                // Worst case: every variable reads every other.
                let deps: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
                for &handle in &handles {
                    scheduler.set_dependencies(handle, &deps);
                }
                black_box(scheduler.variable_count())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_uniform_packing,
    bench_seed_textures,
    bench_scheduler_setup,
);
criterion_main!(benches);
