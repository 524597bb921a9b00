//! Axis reductions.
//!
//! Reduced axes are moved innermost with a transpose when they are not already, so each
//! output element folds one contiguous run of the permuted values.

use num_traits::{NumCast, ToPrimitive};
use onyx_tensor::{Tensor, TensorAccess, TensorElement};

use crate::{
    error::TensorOpsError,
    views::{normalize_axes, transpose, unsqueeze},
};

/// The reduced row-major values, the kept shape and the reduced axes.
struct Folded<T> {
    values: Vec<T>,
    shape: Vec<usize>,
    axes: Vec<usize>,
}

fn resolve_axes(rank: usize, axes: Option<&[i64]>) -> Result<Option<Vec<usize>>, TensorOpsError> {
    let Some(axes) = axes.filter(|a| !a.is_empty()) else {
        return Ok(None);
    };
    if axes.len() > rank {
        return Err(TensorOpsError::InvalidArgument(format!(
            "cannot reduce {} axes of a rank {rank} tensor",
            axes.len()
        )));
    }
    let mut axes = normalize_axes(axes, rank)?;
    axes.sort_unstable();
    Ok(Some(axes))
}

fn fold_axes<T, A, F>(data: &Tensor<T>, axes: Vec<usize>, seed: A, f: F) -> Result<Folded<A>, TensorOpsError>
where
    T: TensorElement,
    A: Copy,
    F: Fn(A, T) -> A,
{
    let shape = data.shape();
    let kept: Vec<usize> = (0..shape.len()).filter(|a| !axes.contains(a)).collect();
    let perm: Vec<usize> = kept.iter().chain(axes.iter()).copied().collect();

    let values = if perm.iter().enumerate().all(|(i, &p)| i == p) {
        data.contiguous().to_vec()
    } else {
        let perm: Vec<i64> = perm.iter().map(|&p| p as i64).collect();
        log::trace!("reduce: permuting axes {perm:?} innermost");
        transpose(data, Some(&perm))?.to_vec()
    };

    let run: usize = axes.iter().map(|&a| shape[a]).product();
    let out_shape: Vec<usize> = kept.iter().map(|&a| shape[a]).collect();
    let out_len: usize = out_shape.iter().product();

    let folded = (0..out_len)
        .map(|o| values[o * run..(o + 1) * run].iter().fold(seed, |acc, &v| f(acc, v)))
        .collect();

    Ok(Folded {
        values: folded,
        shape: out_shape,
        axes,
    })
}

fn finish<T: TensorElement>(folded: Folded<T>, keep_dims: bool) -> Result<Tensor<T>, TensorOpsError> {
    let out = Tensor::from_shape_vec(&folded.shape, folded.values)?;
    if !keep_dims {
        return Ok(out);
    }
    let axes: Vec<i64> = folded.axes.iter().map(|&a| a as i64).collect();
    unsqueeze(&out, &axes)
}

/// Fold `data` along `axes` with `f`, starting every output element from `seed`.
///
/// `axes` that are missing or empty reduce every axis, unless `noop_with_empty_axes` is set,
/// in which case a copy of `data` is returned. With `keep_dims` the reduced axes remain as
/// size 1.
///
/// # Errors
///
/// [`TensorOpsError::InvalidArgument`] if more axes than the rank are given,
/// [`TensorOpsError::AxisOutOfRange`] and [`TensorOpsError::RepeatedAxis`] for invalid
/// entries.
pub fn reduce<T, F>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
    seed: T,
    f: F,
) -> Result<Tensor<T>, TensorOpsError>
where
    T: TensorElement,
    F: Fn(T, T) -> T,
{
    let axes = match resolve_axes(data.rank(), axes)? {
        Some(axes) => axes,
        None if noop_with_empty_axes => return Ok(Tensor::Dense(data.to_dense())),
        None => (0..data.rank()).collect(),
    };
    finish(fold_axes(data, axes, seed, f)?, keep_dims)
}

/// Sum over `axes`. Integer sums wrap on overflow.
///
/// # Example
///
/// ```
/// use onyx_tensor::{Tensor, TensorAccess};
/// use onyx_tensor_ops::reduce::reduce_sum;
///
/// let x = Tensor::<f32>::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// let y = reduce_sum(&x, Some(&[1]), false, false).unwrap();
/// assert_eq!(y.shape(), &[2]);
/// assert_eq!(y.to_vec(), vec![6.0, 15.0]);
/// ```
pub fn reduce_sum<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    reduce(data, axes, keep_dims, noop_with_empty_axes, T::zero(), T::wrapping_add)
}

/// Product over `axes`. Integer products wrap on overflow.
pub fn reduce_prod<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    reduce(data, axes, keep_dims, noop_with_empty_axes, T::one(), T::wrapping_mul)
}

/// Maximum over `axes`.
///
/// Every output starts from [`TensorElement::MIN_VALUE`], not from zero, so a run of
/// all-negative values reduces to its largest element rather than to `0`.
pub fn reduce_max<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    reduce(data, axes, keep_dims, noop_with_empty_axes, T::MIN_VALUE, |a, b| {
        if b > a {
            b
        } else {
            a
        }
    })
}

/// Minimum over `axes`.
pub fn reduce_min<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    reduce(data, axes, keep_dims, noop_with_empty_axes, T::MAX_VALUE, |a, b| {
        if b < a {
            b
        } else {
            a
        }
    })
}

/// Arithmetic mean over `axes`: the sum divided by the number of reduced elements.
///
/// Integer element types are summed in `i128` and divided there with truncation, so the
/// element count is not limited by the range of `T`.
///
/// # Errors
///
/// Besides the axis errors of [`reduce`], [`TensorOpsError::InvalidArgument`] when a
/// reduced axis is empty.
pub fn reduce_mean<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
    keep_dims: bool,
    noop_with_empty_axes: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    let axes = match resolve_axes(data.rank(), axes)? {
        Some(axes) => axes,
        None if noop_with_empty_axes => return Ok(Tensor::Dense(data.to_dense())),
        None => (0..data.rank()).collect(),
    };
    let shape = data.shape();
    let run: usize = axes.iter().map(|&a| shape[a]).product();
    if run == 0 {
        return Err(TensorOpsError::InvalidArgument(
            "cannot average over an empty axis".to_string(),
        ));
    }

    let folded = if T::IS_INTEGER {
        let wide = fold_axes(data, axes, 0i128, |acc, v| acc + v.to_i128().unwrap_or_default())?;
        let values = wide
            .values
            .iter()
            .map(|&sum| {
                <T as NumCast>::from(sum / run as i128).ok_or_else(|| {
                    TensorOpsError::InvalidArgument(format!("mean {sum} / {run} is out of range"))
                })
            })
            .collect::<Result<Vec<T>, _>>()?;
        Folded {
            values,
            shape: wide.shape,
            axes: wide.axes,
        }
    } else {
        let mut folded = fold_axes(data, axes, T::zero(), |a, b| a + b)?;
        let count = <T as NumCast>::from(run).ok_or_else(|| {
            TensorOpsError::InvalidArgument(format!("cannot average over {run} elements"))
        })?;
        folded.values.iter_mut().for_each(|v| *v = *v / count);
        folded
    };
    finish(folded, keep_dims)
}
