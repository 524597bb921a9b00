use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use onyx_tensor::Tensor;
use onyx_tensor_ops::{matmul::matmul_with, HardwareCapabilities};
use rand::Rng;

fn random_tensor(rng: &mut impl Rng, shape: &[usize]) -> Tensor<f32> {
    let len = shape.iter().product();
    let data: Vec<f32> = (0..len).map(|_| rng.random::<f32>()).collect();
    Tensor::from_shape_vec(shape, data).unwrap()
}

fn bench_matmul2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul2d");
    let mut rng = rand::rng();

    let scalar = HardwareCapabilities::scalar();
    let paths = [
        ("scalar", scalar),
        ("simd", scalar.with_simd(true)),
        ("fma", scalar.with_simd(true).with_fma(true)),
    ];

    for size in [32, 64, 128, 256] {
        let a = random_tensor(&mut rng, &[size, size]);
        let b = random_tensor(&mut rng, &[size, size]);

        for (name, caps) in paths {
            group.bench_function(format!("f32_{name}_{size}x{size}"), |bencher| {
                bencher.iter(|| black_box(matmul_with(&caps, &a, &b).unwrap()))
            });
        }
    }

    group.finish();
}

fn bench_matmul_batched(c: &mut Criterion) {
    let mut group = c.benchmark_group("matmul_batched");
    let mut rng = rand::rng();

    let caps = HardwareCapabilities::detect();
    for batch in [4, 16] {
        let a = random_tensor(&mut rng, &[batch, 64, 64]);
        let b = random_tensor(&mut rng, &[64, 64]);

        group.bench_function(format!("f32_batch_{batch}_64x64"), |bencher| {
            bencher.iter(|| black_box(matmul_with(&caps, &a, &b).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_matmul2d, bench_matmul_batched);
criterion_main!(benches);
