use num_traits::{Float, Signed};
use onyx_tensor::{StrideOrder, Tensor, TensorAccess, TensorElement};

use crate::{
    broadcast::try_broadcast,
    config::{self, HardwareCapabilities},
    error::TensorOpsError,
    simd::{SimdElement, SimdFloat},
};

fn check_destination<T: TensorElement>(
    src: &Tensor<T>,
    dst: &Tensor<T>,
) -> Result<(), TensorOpsError> {
    if dst.len() < src.len() {
        return Err(TensorOpsError::DestinationTooSmall {
            required: src.len(),
            actual: dst.len(),
        });
    }
    Ok(())
}

// An input sharing the destination buffer is read from a snapshot so the read and
// write pins never target the same lock.
fn detach<T: TensorElement>(src: &Tensor<T>, dst: &Tensor<T>) -> Tensor<T> {
    if src.shares_storage(dst) {
        Tensor::Dense(src.to_dense())
    } else {
        src.share()
    }
}

/// Apply `f` to every element of `src`, writing `dst[i] = f(src[i])`.
///
/// # Errors
///
/// [`TensorOpsError::DestinationTooSmall`] if `dst` has fewer elements than `src`.
/// Nothing is written on error.
pub fn apply<T, F>(src: &Tensor<T>, dst: &mut Tensor<T>, f: F) -> Result<(), TensorOpsError>
where
    T: TensorElement,
    F: Fn(T) -> T,
{
    check_destination(src, dst)?;
    let src = detach(src, dst);

    let input = src.pin();
    let mut output = dst.pin_mut();
    for i in 0..src.len() {
        output.set_value(i, f(input.value(i)));
    }
    Ok(())
}

/// Apply `f` pairwise, writing `dst[i] = f(lhs[i], rhs[i])`.
///
/// # Errors
///
/// [`TensorOpsError::DestinationTooSmall`] if `dst` is shorter than `lhs`, and
/// [`TensorOpsError::ShapeMismatch`] if `rhs` is shorter than `lhs`. Nothing is written
/// on error.
pub fn apply_binary<T, F>(
    lhs: &Tensor<T>,
    rhs: &Tensor<T>,
    dst: &mut Tensor<T>,
    f: F,
) -> Result<(), TensorOpsError>
where
    T: TensorElement,
    F: Fn(T, T) -> T,
{
    check_destination(lhs, dst)?;
    if rhs.len() < lhs.len() {
        return Err(TensorOpsError::ShapeMismatch(
            lhs.shape().to_vec(),
            rhs.shape().to_vec(),
        ));
    }
    let lhs = detach(lhs, dst);
    let rhs = detach(rhs, dst);

    let left = lhs.pin();
    let right = rhs.pin();
    let mut output = dst.pin_mut();
    for i in 0..lhs.len() {
        output.set_value(i, f(left.value(i), right.value(i)));
    }
    Ok(())
}

fn lanes_unary<T, V, S>(xs: &[T], out: &mut [T], vf: V, sf: S)
where
    T: SimdElement,
    V: Fn(T::Vector) -> T::Vector,
    S: Fn(T) -> T,
{
    let len = xs.len();
    let ceiling = (len / T::LANES) * T::LANES;
    for (x, o) in xs[..ceiling]
        .chunks_exact(T::LANES)
        .zip(out[..ceiling].chunks_exact_mut(T::LANES))
    {
        T::store(vf(T::load(x)), o);
    }
    for i in ceiling..len {
        out[i] = sf(xs[i]);
    }
}

fn lanes_binary<T, V, S>(xs: &[T], ys: &[T], out: &mut [T], vf: V, sf: S)
where
    T: SimdElement,
    V: Fn(T::Vector, T::Vector) -> T::Vector,
    S: Fn(T, T) -> T,
{
    let len = xs.len();
    let ceiling = (len / T::LANES) * T::LANES;
    for ((x, y), o) in xs[..ceiling]
        .chunks_exact(T::LANES)
        .zip(ys[..ceiling].chunks_exact(T::LANES))
        .zip(out[..ceiling].chunks_exact_mut(T::LANES))
    {
        T::store(vf(T::load(x), T::load(y)), o);
    }
    for i in ceiling..len {
        out[i] = sf(xs[i], ys[i]);
    }
}

/// Apply a unary function in lane-width batches, with `sf` on the remainder.
///
/// The lane path runs only when `caps` allows SIMD, both tensors are dense and `dst`
/// does not share the input buffer; otherwise every element goes through [`apply`]
/// with `sf`. `vf` and `sf` must compute the same function.
///
/// # Example
///
/// ```
/// use onyx_tensor::Tensor;
/// use onyx_tensor_ops::{config, elementwise::vectorized_apply, simd::SimdElement};
///
/// let src = Tensor::<f32>::from_shape_fn(&[37], |idx| idx[0] as f32);
/// let mut dst = Tensor::<f32>::zeros(&[37]);
/// vectorized_apply(
///     &config::global(),
///     &src,
///     &mut dst,
///     |v| <f32 as SimdElement>::vmul(v, v),
///     |x| x * x,
/// )
/// .unwrap();
/// assert_eq!(dst.to_vec()[36], 1296.0);
/// ```
pub fn vectorized_apply<T, V, S>(
    caps: &HardwareCapabilities,
    src: &Tensor<T>,
    dst: &mut Tensor<T>,
    vf: V,
    sf: S,
) -> Result<(), TensorOpsError>
where
    T: SimdElement,
    V: Fn(T::Vector) -> T::Vector,
    S: Fn(T) -> T,
{
    check_destination(src, dst)?;
    if !(caps.use_simd() && src.is_dense() && dst.is_dense() && !src.shares_storage(dst)) {
        log::debug!("vectorized_apply: scalar path for {} elements", src.len());
        return apply(src, dst, sf);
    }

    let len = src.len();
    let input = src.pin();
    let mut output = dst.pin_mut();
    if let (Some(xs), Some(out)) = (input.as_slice(), output.as_mut_slice()) {
        lanes_unary(&xs[..len], &mut out[..len], vf, sf);
    }
    Ok(())
}

/// Binary counterpart of [`vectorized_apply`]; every operand must be dense for the
/// lane path.
pub fn vectorized_apply_binary<T, V, S>(
    caps: &HardwareCapabilities,
    lhs: &Tensor<T>,
    rhs: &Tensor<T>,
    dst: &mut Tensor<T>,
    vf: V,
    sf: S,
) -> Result<(), TensorOpsError>
where
    T: SimdElement,
    V: Fn(T::Vector, T::Vector) -> T::Vector,
    S: Fn(T, T) -> T,
{
    check_destination(lhs, dst)?;
    if rhs.len() < lhs.len() {
        return Err(TensorOpsError::ShapeMismatch(
            lhs.shape().to_vec(),
            rhs.shape().to_vec(),
        ));
    }
    let lanes = caps.use_simd()
        && lhs.is_dense()
        && rhs.is_dense()
        && dst.is_dense()
        && !lhs.shares_storage(dst)
        && !rhs.shares_storage(dst);
    if !lanes {
        log::debug!("vectorized_apply_binary: scalar path for {} elements", lhs.len());
        return apply_binary(lhs, rhs, dst, sf);
    }

    let len = lhs.len();
    let left = lhs.pin();
    let right = rhs.pin();
    let mut output = dst.pin_mut();
    if let (Some(xs), Some(ys), Some(out)) =
        (left.as_slice(), right.as_slice(), output.as_mut_slice())
    {
        lanes_binary(&xs[..len], &ys[..len], &mut out[..len], vf, sf);
    }
    Ok(())
}

/// Left-to-right fold over the elements of `src`, starting from `seed`.
pub fn accumulate<T, F>(src: &Tensor<T>, seed: T, f: F) -> T
where
    T: TensorElement,
    F: Fn(T, T) -> T,
{
    let input = src.pin();
    (0..src.len()).fold(seed, |acc, i| f(acc, input.value(i)))
}

fn empty_like<T: TensorElement>(src: &Tensor<T>) -> Tensor<T> {
    let data = vec![T::zero(); src.len()];
    match Tensor::from_shape_vec_with_order(src.shape(), data, src.stride_order()) {
        Ok(t) => t,
        Err(_) => Tensor::zeros(src.shape()),
    }
}

/// Allocate a destination shaped like `src` and [`apply`] `f` into it.
pub fn map<T, F>(src: &Tensor<T>, f: F) -> Result<Tensor<T>, TensorOpsError>
where
    T: TensorElement,
    F: Fn(T) -> T,
{
    let mut dst = empty_like(src);
    apply(src, &mut dst, f)?;
    Ok(dst)
}

/// Allocate a destination shaped like `lhs` and [`apply_binary`] `f` into it.
pub fn map_binary<T, F>(lhs: &Tensor<T>, rhs: &Tensor<T>, f: F) -> Result<Tensor<T>, TensorOpsError>
where
    T: TensorElement,
    F: Fn(T, T) -> T,
{
    let mut dst = empty_like(lhs);
    apply_binary(lhs, rhs, &mut dst, f)?;
    Ok(dst)
}

fn row_major<T: TensorElement>(t: &Tensor<T>) -> Tensor<T> {
    if t.stride_order() == StrideOrder::RowMajor {
        t.share()
    } else {
        Tensor::Dense(t.to_dense())
    }
}

fn unary_op<T, V, S>(x: &Tensor<T>, vf: V, sf: S) -> Result<Tensor<T>, TensorOpsError>
where
    T: SimdElement,
    V: Fn(T::Vector) -> T::Vector,
    S: Fn(T) -> T,
{
    let mut dst = empty_like(x);
    vectorized_apply(&config::global(), x, &mut dst, vf, sf)?;
    Ok(dst)
}

fn binary_op<T, V, S>(
    a: &Tensor<T>,
    b: &Tensor<T>,
    vf: V,
    sf: S,
) -> Result<Tensor<T>, TensorOpsError>
where
    T: SimdElement,
    V: Fn(T::Vector, T::Vector) -> T::Vector,
    S: Fn(T, T) -> T,
{
    let (a, b) = try_broadcast(&row_major(a), &row_major(b))?;
    let mut dst = Tensor::zeros(a.shape());
    vectorized_apply_binary(&config::global(), &a, &b, &mut dst, vf, sf)?;
    Ok(dst)
}

/// Elementwise `a + b` with broadcasting. Integer overflow wraps.
///
/// # Example
///
/// ```
/// use onyx_tensor::Tensor;
/// use onyx_tensor_ops::elementwise::add;
///
/// let a = Tensor::<i32>::from_shape_vec(&[2, 2], vec![1, 2, 3, 4]).unwrap();
/// let b = Tensor::<i32>::from_shape_vec(&[2], vec![10, 20]).unwrap();
/// assert_eq!(add(&a, &b).unwrap().to_vec(), vec![11, 22, 13, 24]);
/// ```
pub fn add<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    binary_op(a, b, T::vadd, T::wrapping_add)
}

/// Elementwise `a - b` with broadcasting.
pub fn sub<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    binary_op(a, b, T::vsub, T::wrapping_sub)
}

/// Elementwise `a * b` with broadcasting.
pub fn mul<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    binary_op(a, b, T::vmul, T::wrapping_mul)
}

/// Elementwise `a / b` with broadcasting.
pub fn div<T: SimdElement>(a: &Tensor<T>, b: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    binary_op(a, b, T::vdiv, |x, y| x / y)
}

/// Add a scalar to every element.
pub fn add_scalar<T: SimdElement>(x: &Tensor<T>, s: T) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, |v| T::vadd(v, T::splat(s)), |a| a.wrapping_add(s))
}

/// Subtract a scalar from every element.
pub fn sub_scalar<T: SimdElement>(x: &Tensor<T>, s: T) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, |v| T::vsub(v, T::splat(s)), |a| a.wrapping_sub(s))
}

/// Multiply every element by a scalar.
pub fn mul_scalar<T: SimdElement>(x: &Tensor<T>, s: T) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, |v| T::vmul(v, T::splat(s)), |a| a.wrapping_mul(s))
}

/// Divide every element by a scalar.
pub fn div_scalar<T: SimdElement>(x: &Tensor<T>, s: T) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, |v| T::vdiv(v, T::splat(s)), |a| a / s)
}

/// Elementwise negation.
pub fn neg<T: SimdElement + Signed>(x: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, T::vneg, |a| -a)
}

/// Elementwise absolute value.
pub fn abs<T: SimdElement + Signed>(x: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, T::vabs, |a| a.abs())
}

/// Elementwise `x * x`.
pub fn square<T: SimdElement>(x: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, |v| T::vmul(v, v), |a| a.wrapping_mul(a))
}

/// Elementwise square root.
pub fn sqrt<T: SimdFloat>(x: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    unary_op(x, T::vsqrt, |a| a.sqrt())
}

/// Elementwise `max(x, 0)`.
pub fn relu<T: SimdElement>(x: &Tensor<T>) -> Result<Tensor<T>, TensorOpsError> {
    let zero = T::zero();
    unary_op(
        x,
        |v| T::vmax(v, T::splat(zero)),
        |a| if a > zero { a } else { zero },
    )
}

/// Elementwise `a ^ b` with broadcasting.
pub fn pow<T: TensorElement + Float>(
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<Tensor<T>, TensorOpsError> {
    let (a, b) = try_broadcast(&row_major(a), &row_major(b))?;
    let mut dst = Tensor::zeros(a.shape());
    apply_binary(&a, &b, &mut dst, |x, y| x.powf(y))?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn simd() -> HardwareCapabilities {
        HardwareCapabilities::scalar().with_simd(true)
    }

    #[test]
    fn test_apply_unary() -> Result<(), TensorOpsError> {
        let src = Tensor::<i32>::from_shape_vec(&[4], vec![1, 2, 3, 4])?;
        let mut dst = Tensor::<i32>::zeros(&[4]);
        apply(&src, &mut dst, |x| x * 10)?;
        assert_eq!(dst.to_vec(), vec![10, 20, 30, 40]);
        Ok(())
    }

    #[test]
    fn test_destination_too_small_writes_nothing() -> Result<(), TensorOpsError> {
        let src = Tensor::<f32>::from_shape_val(&[5], 1.0);
        let mut dst = Tensor::<f32>::from_shape_val(&[3], 9.0);
        let res = apply(&src, &mut dst, |x| x);
        assert_eq!(
            res,
            Err(TensorOpsError::DestinationTooSmall {
                required: 5,
                actual: 3
            })
        );
        assert_eq!(dst.to_vec(), vec![9.0; 3]);
        Ok(())
    }

    #[test]
    fn test_short_rhs_is_shape_mismatch() {
        let lhs = Tensor::<u8>::zeros(&[4]);
        let rhs = Tensor::<u8>::zeros(&[2]);
        let mut dst = Tensor::<u8>::zeros(&[4]);
        assert!(matches!(
            apply_binary(&lhs, &rhs, &mut dst, |a, b| a + b),
            Err(TensorOpsError::ShapeMismatch(..))
        ));
    }

    #[test]
    fn test_in_place_apply() -> Result<(), TensorOpsError> {
        let src = Tensor::<f64>::from_shape_vec(&[3], vec![1.0, 2.0, 3.0])?;
        let mut dst = src.share();
        apply(&src, &mut dst, |x| x + 1.0)?;
        assert_eq!(src.to_vec(), vec![2.0, 3.0, 4.0]);

        vectorized_apply(&simd(), &src, &mut dst, |v| <f64 as SimdElement>::vadd(v, v), |x| x + x)?;
        assert_eq!(src.to_vec(), vec![4.0, 6.0, 8.0]);
        Ok(())
    }

    #[test]
    fn test_lanes_match_scalar_with_tail() -> Result<(), TensorOpsError> {
        let src = Tensor::<f32>::from_shape_fn(&[37], |idx| idx[0] as f32 * 0.37 - 5.0);
        let mut lanes = Tensor::<f32>::zeros(&[37]);
        let mut scalar = Tensor::<f32>::zeros(&[37]);
        let vf = |v| <f32 as SimdElement>::vmul(v, <f32 as SimdElement>::vadd(v, v));
        let sf = |x: f32| x * (x + x);
        vectorized_apply(&simd(), &src, &mut lanes, vf, sf)?;
        vectorized_apply(&HardwareCapabilities::scalar(), &src, &mut scalar, vf, sf)?;
        assert_eq!(lanes.to_vec(), scalar.to_vec());
        Ok(())
    }

    #[test]
    fn test_integer_overflow_wraps_on_both_paths() -> Result<(), TensorOpsError> {
        // 8 lanes plus a one element tail
        let lhs = Tensor::<i32>::from_shape_val(&[9], i32::MAX);
        let rhs = Tensor::<i32>::from_shape_val(&[9], 1);
        let mut lanes = Tensor::<i32>::zeros(&[9]);
        let mut scalar = Tensor::<i32>::zeros(&[9]);
        let vf = <i32 as SimdElement>::vadd;
        let sf = <i32 as TensorElement>::wrapping_add;
        vectorized_apply_binary(&simd(), &lhs, &rhs, &mut lanes, vf, sf)?;
        let scalar_caps = HardwareCapabilities::scalar();
        vectorized_apply_binary(&scalar_caps, &lhs, &rhs, &mut scalar, vf, sf)?;
        assert_eq!(lanes.to_vec(), vec![i32::MIN; 9]);
        assert_eq!(lanes.to_vec(), scalar.to_vec());

        let a = Tensor::<u8>::from_shape_val(&[2], 200);
        let b = Tensor::<u8>::from_shape_val(&[2], 100);
        assert_eq!(add(&a, &b)?.to_vec(), vec![44, 44]);
        assert_eq!(sub(&b, &a)?.to_vec(), vec![156, 156]);
        assert_eq!(mul(&a, &b)?.to_vec(), vec![32, 32]);

        let big = Tensor::<i64>::from_shape_val(&[3], i64::MAX);
        assert_eq!(add_scalar(&big, 1)?.to_vec(), vec![i64::MIN; 3]);
        assert_eq!(square(&Tensor::<i32>::from_shape_val(&[11], 65536))?.to_vec(), vec![0; 11]);
        Ok(())
    }

    #[test]
    fn test_broadcast_operand_takes_scalar_path() -> Result<(), TensorOpsError> {
        let a = Tensor::<i32>::from_shape_vec(&[2, 3], vec![1, 2, 3, 4, 5, 6])?;
        let b = Tensor::<i32>::from_shape_vec(&[2, 1], vec![10, 20])?;
        assert_eq!(mul(&a, &b)?.to_vec(), vec![10, 20, 30, 80, 100, 120]);
        assert_eq!(sub(&b, &a)?.to_vec(), vec![9, 8, 7, 16, 15, 14]);
        assert_eq!(div(&a, &b)?.shape(), &[2, 3]);
        assert!(matches!(
            add(&a, &Tensor::<i32>::zeros(&[3, 3])),
            Err(TensorOpsError::BroadcastIncompatible(..))
        ));
        Ok(())
    }

    #[test]
    fn test_scalar_ops() -> Result<(), TensorOpsError> {
        let x = Tensor::<f32>::from_shape_fn(&[3, 5], |idx| (idx[0] * 5 + idx[1]) as f32);
        let y = div_scalar(&mul_scalar(&add_scalar(&x, 1.0)?, 4.0)?, 2.0)?;
        let y = sub_scalar(&y, 2.0)?;
        for (i, v) in y.to_vec().into_iter().enumerate() {
            assert_relative_eq!(v, i as f32 * 2.0);
        }
        Ok(())
    }

    #[test]
    fn test_unary_math() -> Result<(), TensorOpsError> {
        let x = Tensor::<f64>::from_shape_vec(&[5], vec![-4.0, -1.0, 0.0, 9.0, 16.0])?;
        assert_eq!(neg(&x)?.to_vec(), vec![4.0, 1.0, -0.0, -9.0, -16.0]);
        assert_eq!(relu(&x)?.to_vec(), vec![0.0, 0.0, 0.0, 9.0, 16.0]);
        assert_eq!(sqrt(&abs(&x)?)?.to_vec(), vec![2.0, 1.0, 0.0, 3.0, 4.0]);
        assert_eq!(square(&x)?.to_vec(), vec![16.0, 1.0, 0.0, 81.0, 256.0]);

        let i = Tensor::<i64>::from_shape_vec(&[3], vec![-2, 0, 3])?;
        assert_eq!(abs(&i)?.to_vec(), vec![2, 0, 3]);
        assert_eq!(relu(&i)?.to_vec(), vec![0, 0, 3]);
        Ok(())
    }

    #[test]
    fn test_pow_broadcasts() -> Result<(), TensorOpsError> {
        let base = Tensor::<f32>::from_shape_vec(&[2, 2], vec![1.0, 2.0, 3.0, 4.0])?;
        let exp = Tensor::scalar(2.0f32);
        let out = pow(&base, &exp)?;
        for (a, b) in out.to_vec().iter().zip([1.0, 4.0, 9.0, 16.0]) {
            assert_relative_eq!(*a, b, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_accumulate_folds_left() -> Result<(), TensorOpsError> {
        let x = Tensor::<i32>::from_shape_vec(&[4], vec![1, 2, 3, 4])?;
        assert_eq!(accumulate(&x, 0, |acc, v| acc * 10 + v), 1234);
        let view = Tensor::<i32>::from_shape_vec(&[1], vec![2])?.broadcast_dim(0, 3)?;
        assert_eq!(accumulate(&view, 1, |acc, v| acc * v), 8);
        Ok(())
    }

    #[test]
    fn test_map_preserves_stride_order() -> Result<(), TensorOpsError> {
        let x = Tensor::<u8>::from_shape_vec_with_order(&[2, 2], vec![1, 2, 3, 4], StrideOrder::Reversed)?;
        let y = map(&x, |v| v + 1)?;
        assert_eq!(y.stride_order(), StrideOrder::Reversed);
        assert_eq!(y.get(&[1, 0])?, 3);
        let z = map_binary(&x, &y, |a, b| a * b)?;
        assert_eq!(z.to_vec(), vec![2, 6, 12, 20]);
        Ok(())
    }
}
