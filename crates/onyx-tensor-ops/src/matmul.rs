//! Matrix multiplication: three 2D kernel bodies and a batched N-D driver.
//!
//! Every body computes `C (m x n) = A (m x k) * B (k x n)` on row-major slices:
//!
//! - [`MatMulKernel::Scalar`]: i-p-j triple loop.
//! - [`MatMulKernel::Simd`]: the same loop order with lane-width chunks of each `B` row.
//! - [`MatMulKernel::FusedTile`]: AVX2+FMA register tile of two rows by four 8-wide
//!   vectors (`f32` on x86-64).

use onyx_tensor::{shape::increment_index, Tensor, TensorAccess, TensorElement};

use crate::{
    broadcast::{broadcast_shape, broadcast_to},
    config::{self, HardwareCapabilities},
    error::TensorOpsError,
    simd::SimdElement,
};

/// Rows covered by one fused tile.
pub const TILE_ROWS: usize = 2;

/// Output columns covered by one fused tile (four 8-lane vectors).
pub const TILE_COLS: usize = 32;

/// The 2D kernel body chosen for a multiply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatMulKernel {
    /// Plain triple loop.
    Scalar,
    /// Lane-batched inner loop.
    Simd,
    /// Fused-multiply-add 2x4 register tile.
    FusedTile,
}

/// Choose the kernel body from capabilities and shape divisibility only.
///
/// The fused tile needs SIMD and FMA support, an element type that has the tile, an even row
/// count and an output column count divisible by 32. Otherwise the lane loop runs when
/// SIMD is allowed, and the scalar loop when it is not.
pub fn select_matmul_kernel<T: SimdElement>(
    caps: &HardwareCapabilities,
    m: usize,
    _k: usize,
    n: usize,
) -> MatMulKernel {
    let tile_shaped = m % TILE_ROWS == 0 && n % TILE_COLS == 0;
    if caps.use_simd() && caps.use_fma() && T::HAS_FUSED_TILE && tile_shaped {
        MatMulKernel::FusedTile
    } else if caps.use_simd() {
        MatMulKernel::Simd
    } else {
        MatMulKernel::Scalar
    }
}

/// Scalar body.
pub fn matmul_scalar<T: TensorElement>(a: &[T], b: &[T], c: &mut [T], m: usize, k: usize, n: usize) {
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(T::zero());
        for p in 0..k {
            let a_ip = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in c_row.iter_mut().zip(b_row.iter()) {
                *c_ij = c_ij.wrapping_add(a_ip.wrapping_mul(b_pj));
            }
        }
    }
}

/// Lane body: each `B` row is processed in `LANES`-wide chunks with a scalar remainder.
pub fn matmul_simd<T: SimdElement>(a: &[T], b: &[T], c: &mut [T], m: usize, k: usize, n: usize) {
    let ceiling = (n / T::LANES) * T::LANES;
    for i in 0..m {
        let c_row = &mut c[i * n..(i + 1) * n];
        c_row.fill(T::zero());
        for p in 0..k {
            let a_ip = a[i * k + p];
            let a_vec = T::splat(a_ip);
            let b_row = &b[p * n..(p + 1) * n];

            for (c_chunk, b_chunk) in c_row[..ceiling]
                .chunks_exact_mut(T::LANES)
                .zip(b_row[..ceiling].chunks_exact(T::LANES))
            {
                let acc = T::vadd(T::load(c_chunk), T::vmul(a_vec, T::load(b_chunk)));
                T::store(acc, c_chunk);
            }

            for j in ceiling..n {
                c_row[j] = c_row[j].wrapping_add(a_ip.wrapping_mul(b_row[j]));
            }
        }
    }
}

/// AVX2+FMA 2x4 tile body for `f32`.
///
/// # Safety
///
/// The caller must ensure the host supports AVX2 and FMA, `m` is even, `n` is a
/// multiple of 32 and the slices hold `m*k`, `k*n` and `m*n` elements.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2,fma")]
pub(crate) unsafe fn matmul_tile_2x4_f32(
    a: &[f32],
    b: &[f32],
    c: &mut [f32],
    m: usize,
    k: usize,
    n: usize,
) {
    use std::arch::x86_64::*;

    for i in (0..m).step_by(TILE_ROWS) {
        let a0 = &a[i * k..(i + 1) * k];
        let a1 = &a[(i + 1) * k..(i + 2) * k];

        for j in (0..n).step_by(TILE_COLS) {
            let mut c00 = _mm256_setzero_ps();
            let mut c01 = _mm256_setzero_ps();
            let mut c02 = _mm256_setzero_ps();
            let mut c03 = _mm256_setzero_ps();
            let mut c10 = _mm256_setzero_ps();
            let mut c11 = _mm256_setzero_ps();
            let mut c12 = _mm256_setzero_ps();
            let mut c13 = _mm256_setzero_ps();

            for p in 0..k {
                let b_row = &b[p * n + j..p * n + j + TILE_COLS];
                let b0 = _mm256_loadu_ps(b_row[0..8].as_ptr());
                let b1 = _mm256_loadu_ps(b_row[8..16].as_ptr());
                let b2 = _mm256_loadu_ps(b_row[16..24].as_ptr());
                let b3 = _mm256_loadu_ps(b_row[24..32].as_ptr());

                let va0 = _mm256_set1_ps(a0[p]);
                c00 = _mm256_fmadd_ps(va0, b0, c00);
                c01 = _mm256_fmadd_ps(va0, b1, c01);
                c02 = _mm256_fmadd_ps(va0, b2, c02);
                c03 = _mm256_fmadd_ps(va0, b3, c03);

                let va1 = _mm256_set1_ps(a1[p]);
                c10 = _mm256_fmadd_ps(va1, b0, c10);
                c11 = _mm256_fmadd_ps(va1, b1, c11);
                c12 = _mm256_fmadd_ps(va1, b2, c12);
                c13 = _mm256_fmadd_ps(va1, b3, c13);
            }

            let c_row0 = &mut c[i * n + j..i * n + j + TILE_COLS];
            _mm256_storeu_ps(c_row0[0..8].as_mut_ptr(), c00);
            _mm256_storeu_ps(c_row0[8..16].as_mut_ptr(), c01);
            _mm256_storeu_ps(c_row0[16..24].as_mut_ptr(), c02);
            _mm256_storeu_ps(c_row0[24..32].as_mut_ptr(), c03);

            let c_row1 = &mut c[(i + 1) * n + j..(i + 1) * n + j + TILE_COLS];
            _mm256_storeu_ps(c_row1[0..8].as_mut_ptr(), c10);
            _mm256_storeu_ps(c_row1[8..16].as_mut_ptr(), c11);
            _mm256_storeu_ps(c_row1[16..24].as_mut_ptr(), c12);
            _mm256_storeu_ps(c_row1[24..32].as_mut_ptr(), c13);
        }
    }
}

fn run_kernel<T: SimdElement>(
    kernel: MatMulKernel,
    a: &[T],
    b: &[T],
    c: &mut [T],
    m: usize,
    k: usize,
    n: usize,
) {
    match kernel {
        MatMulKernel::Scalar => matmul_scalar(a, b, c, m, k, n),
        MatMulKernel::Simd => matmul_simd(a, b, c, m, k, n),
        MatMulKernel::FusedTile => {
            if !T::fused_tile_matmul(a, b, c, m, k, n) {
                matmul_simd(a, b, c, m, k, n);
            }
        }
    }
}

/// Multiply two rank-2 tensors using the process-wide capabilities.
///
/// # Example
///
/// ```
/// use onyx_tensor::Tensor;
/// use onyx_tensor_ops::matmul::matmul2d;
///
/// let a = Tensor::<i32>::from_shape_vec(&[2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
/// let b = Tensor::<i32>::from_shape_vec(&[3, 2], vec![7, 8, 9, 10, 11, 12]).unwrap();
/// let c = matmul2d(&a, &b).unwrap();
/// assert_eq!(c.to_vec(), vec![58, 64, 139, 154]);
/// ```
pub fn matmul2d<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    matmul2d_with(&config::global(), a, b)
}

/// Multiply two rank-2 tensors with explicit capabilities.
///
/// # Errors
///
/// [`TensorOpsError::RankMismatch`] unless both operands are rank 2, and
/// [`TensorOpsError::ShapeMismatch`] when the inner dimensions differ.
pub fn matmul2d_with<T: SimdElement>(
    caps: &HardwareCapabilities,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorOpsError> {
    if a.rank() != 2 {
        return Err(TensorOpsError::rank_mismatch("matmul2d", 2, a.rank()));
    }
    if b.rank() != 2 {
        return Err(TensorOpsError::rank_mismatch("matmul2d", 2, b.rank()));
    }
    let (m, k) = (a.shape()[0], a.shape()[1]);
    let n = b.shape()[1];
    if b.shape()[0] != k {
        return Err(TensorOpsError::ShapeMismatch(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }

    let kernel = select_matmul_kernel::<T>(caps, m, k, n);
    log::debug!("matmul2d {m}x{k} * {k}x{n} using {kernel:?}");

    let a = Tensor::Dense(a.contiguous());
    let b = Tensor::Dense(b.contiguous());
    let mut c = vec![T::zero(); m * n];
    {
        let a_pin = a.pin();
        let b_pin = b.pin();
        run_kernel(kernel, a_pin.buffer(), b_pin.buffer(), &mut c, m, k, n);
    }
    Ok(Tensor::from_shape_vec(&[m, n], c)?)
}

/// Batched matrix multiply with NumPy semantics, using the process-wide capabilities.
///
/// - Rank-1 operands are promoted to matrices and the promoted axes are dropped from
///   the result; two rank-1 operands yield a rank-0 dot product.
/// - For rank > 2 the last two axes are the matrix and the leading axes broadcast.
pub fn matmul<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    matmul_with(&config::global(), a, b)
}

/// [`matmul`] with explicit capabilities.
pub fn matmul_with<T: SimdElement>(
    caps: &HardwareCapabilities,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorOpsError> {
    if a.rank() == 0 {
        return Err(TensorOpsError::rank_mismatch("matmul", ">= 1", 0));
    }
    if b.rank() == 0 {
        return Err(TensorOpsError::rank_mismatch("matmul", ">= 1", 0));
    }

    let promote_a = a.rank() == 1;
    let promote_b = b.rank() == 1;
    let a = if promote_a { a.insert_dim(0)? } else { a.share() };
    let b = if promote_b { b.insert_dim(1)? } else { b.share() };

    let mut out = if a.rank() == 2 && b.rank() == 2 {
        matmul2d_with(caps, &a, &b)?
    } else {
        matmul_batched(caps, &a, &b)?
    };

    let rank = out.rank();
    if promote_b {
        out = out.remove_dim(rank - 1)?;
    }
    if promote_a {
        out = out.remove_dim(rank - 2)?;
    }
    Ok(out)
}

fn matmul_batched<T: SimdElement>(
    caps: &HardwareCapabilities,
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorOpsError> {
    let (ra, rb) = (a.rank(), b.rank());
    let (m, k) = (a.shape()[ra - 2], a.shape()[ra - 1]);
    let n = b.shape()[rb - 1];
    if b.shape()[rb - 2] != k {
        return Err(TensorOpsError::ShapeMismatch(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }

    let incompatible =
        || TensorOpsError::BroadcastIncompatible(a.shape().to_vec(), b.shape().to_vec());
    let batch = broadcast_shape(&a.shape()[..ra - 2], &b.shape()[..rb - 2]).ok_or_else(incompatible)?;
    let batch_len: usize = batch.iter().product();

    let mut out_shape = batch.clone();
    out_shape.extend_from_slice(&[m, n]);
    if batch_len == 0 || m == 0 || n == 0 || k == 0 {
        return Ok(Tensor::zeros(&out_shape));
    }

    let mut a_shape = batch.clone();
    a_shape.extend_from_slice(&[m, k]);
    let mut b_shape = batch.clone();
    b_shape.extend_from_slice(&[k, n]);

    // matrix slices must be contiguous row-major runs of the source buffers
    let a = broadcast_to(&Tensor::Dense(a.contiguous()), &a_shape).ok_or_else(incompatible)?;
    let b = broadcast_to(&Tensor::Dense(b.contiguous()), &b_shape).ok_or_else(incompatible)?;

    let kernel = select_matmul_kernel::<T>(caps, m, k, n);
    log::debug!(
        "matmul batch {batch:?} of {m}x{k} * {k}x{n} using {kernel:?}"
    );

    let mut c = vec![T::zero(); batch_len * m * n];
    let a_pin = a.pin();
    let b_pin = b.pin();
    let mut batch_idx = vec![0; batch.len()];
    let mut a_idx = vec![0; batch.len() + 2];
    let mut b_idx = vec![0; batch.len() + 2];

    for c_mat in c.chunks_exact_mut(m * n) {
        a_idx[..batch.len()].copy_from_slice(&batch_idx);
        b_idx[..batch.len()].copy_from_slice(&batch_idx);
        let a_off = a.storage_offset(&a_idx)?;
        let b_off = b.storage_offset(&b_idx)?;
        log::trace!("matmul batch {batch_idx:?}: a at {a_off}, b at {b_off}");

        run_kernel(
            kernel,
            &a_pin.buffer()[a_off..a_off + m * k],
            &b_pin.buffer()[b_off..b_off + k * n],
            c_mat,
            m,
            k,
            n,
        );
        increment_index(&mut batch_idx, &batch);
    }
    drop(a_pin);
    drop(b_pin);

    Ok(Tensor::from_shape_vec(&out_shape, c)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn all_paths() -> Vec<HardwareCapabilities> {
        let scalar = HardwareCapabilities::scalar();
        vec![scalar, scalar.with_simd(true), scalar.with_simd(true).with_fma(true)]
    }

    #[test]
    fn test_known_product_on_every_path() -> Result<(), TensorOpsError> {
        let a = Tensor::<f32>::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let b = Tensor::<f32>::from_shape_vec(&[3, 2], vec![7.0, 8.0, 9.0, 10.0, 11.0, 12.0])?;
        // (2, 3) x (3, 32) is tile shaped: the first three columns of `eye` copy `a`
        let eye = Tensor::<f32>::from_shape_fn(&[3, 32], |idx| match idx[0] == idx[1] {
            true => 1.0,
            false => 0.0,
        });
        for caps in all_paths() {
            let c = matmul2d_with(&caps, &a, &b)?;
            assert_eq!(c.shape(), &[2, 2]);
            assert_eq!(c.to_vec(), vec![58.0, 64.0, 139.0, 154.0]);

            let kernel = select_matmul_kernel::<f32>(&caps, 2, 3, 32);
            let c = matmul2d_with(&caps, &a, &eye)?;
            assert_eq!(c.shape(), &[2, 32], "{kernel:?}");
            assert_eq!(c.get(&[0, 2])?, 3.0, "{kernel:?}");
            assert_eq!(c.get(&[1, 0])?, 4.0, "{kernel:?}");
            assert_eq!(c.get(&[1, 31])?, 0.0, "{kernel:?}");
        }
        Ok(())
    }

    #[test]
    fn test_kernel_selection() {
        let scalar = HardwareCapabilities::scalar();
        let simd = scalar.with_simd(true);
        assert_eq!(select_matmul_kernel::<f32>(&scalar, 4, 3, 64), MatMulKernel::Scalar);
        assert_eq!(select_matmul_kernel::<f32>(&simd, 4, 3, 64), MatMulKernel::Simd);

        // FMA alone never selects the tile
        let fma_only = scalar.with_fma(true);
        assert_eq!(select_matmul_kernel::<f32>(&fma_only, 4, 3, 64), MatMulKernel::Scalar);

        let fma = simd.with_fma(true);
        if fma.use_fma() {
            assert_eq!(select_matmul_kernel::<f32>(&fma, 4, 3, 64), MatMulKernel::FusedTile);
            assert_eq!(select_matmul_kernel::<f32>(&fma, 3, 3, 64), MatMulKernel::Simd);
            assert_eq!(select_matmul_kernel::<f32>(&fma, 4, 3, 48), MatMulKernel::Simd);
            assert_eq!(select_matmul_kernel::<f64>(&fma, 4, 3, 64), MatMulKernel::Simd);
        }
    }

    #[test]
    fn test_tiled_agrees_with_scalar() -> Result<(), TensorOpsError> {
        let (m, k, n) = (4, 19, 64);
        let a = Tensor::<f32>::from_shape_fn(&[m, k], |idx| ((idx[0] * 7 + idx[1] * 3) % 11) as f32 * 0.25);
        let b = Tensor::<f32>::from_shape_fn(&[k, n], |idx| ((idx[0] * 5 + idx[1]) % 13) as f32 * 0.5 - 2.0);
        let reference = matmul2d_with(&HardwareCapabilities::scalar(), &a, &b)?.to_vec();
        for caps in all_paths() {
            let c = matmul2d_with(&caps, &a, &b)?.to_vec();
            for (x, y) in c.iter().zip(reference.iter()) {
                assert_relative_eq!(*x, *y, epsilon = 1e-4, max_relative = 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_integer_lanes_with_remainder() -> Result<(), TensorOpsError> {
        let a = Tensor::<i32>::from_shape_fn(&[3, 5], |idx| (idx[0] + idx[1]) as i32);
        let b = Tensor::<i32>::from_shape_fn(&[5, 11], |idx| (idx[0] as i32) - (idx[1] as i32));
        let simd = HardwareCapabilities::scalar().with_simd(true);
        assert_eq!(
            matmul2d_with(&simd, &a, &b)?.to_vec(),
            matmul2d_with(&HardwareCapabilities::scalar(), &a, &b)?.to_vec()
        );

        // accumulators wrap on both paths, lanes and remainder alike
        let big = Tensor::<i32>::from_shape_val(&[1, 2], i32::MAX);
        let ones = Tensor::<i32>::from_shape_val(&[2, 9], 1);
        let lanes = matmul2d_with(&simd, &big, &ones)?.to_vec();
        assert_eq!(lanes, vec![-2; 9]);
        assert_eq!(lanes, matmul2d_with(&HardwareCapabilities::scalar(), &big, &ones)?.to_vec());
        Ok(())
    }

    #[test]
    fn test_rank_errors() {
        let s = Tensor::scalar(1.0f32);
        let v = Tensor::<f32>::zeros(&[3]);
        assert!(matches!(matmul(&s, &v), Err(TensorOpsError::RankMismatch { .. })));
        assert!(matches!(matmul2d(&v, &v), Err(TensorOpsError::RankMismatch { .. })));
        let a = Tensor::<f32>::zeros(&[2, 3]);
        assert!(matches!(matmul2d(&a, &a), Err(TensorOpsError::ShapeMismatch(..))));
    }

    #[test]
    fn test_vector_promotion() -> Result<(), TensorOpsError> {
        let v = Tensor::<f64>::from_shape_vec(&[3], vec![1.0, 2.0, 3.0])?;
        let dot = matmul(&v, &v)?;
        assert_eq!(dot.rank(), 0);
        assert_eq!(dot.get(&[0])?, 14.0);

        let m = Tensor::<f64>::from_shape_vec(&[3, 2], vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0])?;
        let vm = matmul(&v, &m)?;
        assert_eq!(vm.shape(), &[2]);
        assert_eq!(vm.to_vec(), vec![4.0, 5.0]);

        let mt = Tensor::<f64>::from_shape_vec(&[2, 3], vec![1.0, 0.0, 1.0, 0.0, 1.0, 1.0])?;
        let mv = matmul(&mt, &v)?;
        assert_eq!(mv.shape(), &[2]);
        assert_eq!(mv.to_vec(), vec![4.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_batched_broadcast() -> Result<(), TensorOpsError> {
        // a: (2, 1, 2, 2), b: (3, 2, 2) -> (2, 3, 2, 2)
        let a = Tensor::<f32>::from_shape_vec(
            &[2, 1, 2, 2],
            vec![1.0, 0.0, 0.0, 1.0, 2.0, 0.0, 0.0, 2.0],
        )?;
        let b = Tensor::<f32>::from_shape_fn(&[3, 2, 2], |idx| (idx[0] * 4 + idx[1] * 2 + idx[2]) as f32);
        let c = matmul(&a, &b)?;
        assert_eq!(c.shape(), &[2, 3, 2, 2]);
        for batch in 0..3 {
            for r in 0..2 {
                for col in 0..2 {
                    let expected = b.get(&[batch, r, col])?;
                    assert_eq!(c.get(&[0, batch, r, col])?, expected);
                    assert_eq!(c.get(&[1, batch, r, col])?, 2.0 * expected);
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_batched_incompatible() {
        let a = Tensor::<f32>::zeros(&[2, 2, 3]);
        let b = Tensor::<f32>::zeros(&[3, 3, 2]);
        assert!(matches!(
            matmul(&a, &b),
            Err(TensorOpsError::BroadcastIncompatible(..))
        ));
    }

    #[test]
    fn test_same_operand_twice() -> Result<(), TensorOpsError> {
        let x = Tensor::<f32>::from_shape_vec(&[2, 2, 2], vec![1.0, 2.0, 3.0, 4.0, 0.0, 1.0, 1.0, 0.0])?;
        let y = matmul(&x, &x)?;
        assert_eq!(y.to_vec(), vec![7.0, 10.0, 15.0, 22.0, 1.0, 0.0, 0.0, 1.0]);
        Ok(())
    }
}
