use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use onyx_tensor::Tensor;
use onyx_tensor_ops::{
    config,
    elementwise::{self, vectorized_apply_binary},
    simd::SimdElement,
    HardwareCapabilities,
};
use rand::Rng;

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");
    let mut rng = rand::rng();

    let test_sizes = vec![37, 1024, 16384, 262144];

    for size in test_sizes {
        let a: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        let b: Vec<f32> = (0..size).map(|_| rng.random::<f32>()).collect();
        let a_tensor = Tensor::<f32>::from_shape_vec(&[size], a).unwrap();
        let b_tensor = Tensor::<f32>::from_shape_vec(&[size], b).unwrap();
        let mut dst = Tensor::<f32>::zeros(&[size]);

        for (name, caps) in [
            ("scalar", HardwareCapabilities::scalar()),
            ("detected", config::global()),
        ] {
            group.bench_function(format!("f32_{name}_size_{size}"), |bencher| {
                bencher.iter(|| {
                    vectorized_apply_binary(
                        &caps,
                        &a_tensor,
                        &b_tensor,
                        &mut dst,
                        <f32 as SimdElement>::vadd,
                        |x, y| x + y,
                    )
                    .unwrap();
                    black_box(&dst);
                })
            });
        }
    }

    group.finish();
}

fn bench_broadcast_mul(c: &mut Criterion) {
    let mut group = c.benchmark_group("broadcast_mul");
    let mut rng = rand::rng();

    for rows in [16, 256, 1024] {
        let a: Vec<f32> = (0..rows * 64).map(|_| rng.random::<f32>()).collect();
        let b: Vec<f32> = (0..64).map(|_| rng.random::<f32>()).collect();
        let a_tensor = Tensor::<f32>::from_shape_vec(&[rows, 64], a).unwrap();
        let b_tensor = Tensor::<f32>::from_shape_vec(&[64], b).unwrap();

        group.bench_function(format!("f32_{rows}x64"), |bencher| {
            bencher.iter(|| black_box(elementwise::mul(&a_tensor, &b_tensor).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_broadcast_mul);
criterion_main!(benches);
