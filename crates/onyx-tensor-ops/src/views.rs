//! Shape-transforming operators: transpose, slice, concat, gather, reshape, unsqueeze and
//! squeeze.
//!
//! Every operator validates its arguments before touching any data. Results are new
//! row-major dense tensors, except [`reshape`], [`unsqueeze`] and [`squeeze`], which share
//! the input buffer whenever its layout allows it.

use onyx_tensor::{
    shape::{increment_index, normalize_axis},
    Tensor, TensorAccess, TensorElement, TensorError,
};

use crate::error::TensorOpsError;

fn resolve_axis(axis: i64, rank: usize) -> Result<usize, TensorOpsError> {
    normalize_axis(axis, rank).ok_or(TensorOpsError::AxisOutOfRange(axis, rank))
}

/// Normalizes `axes` against `rank`, rejecting out-of-range and repeated entries.
pub(crate) fn normalize_axes(axes: &[i64], rank: usize) -> Result<Vec<usize>, TensorOpsError> {
    let mut seen = vec![false; rank];
    axes.iter()
        .map(|&a| {
            let a = resolve_axis(a, rank)?;
            if std::mem::replace(&mut seen[a], true) {
                return Err(TensorOpsError::RepeatedAxis(a));
            }
            Ok(a)
        })
        .collect()
}

/// Reads `out_shape` elements of `data` starting at buffer offset `base` and stepping by
/// `src_strides` per axis.
fn collect_strided<T: TensorElement>(
    data: &Tensor<T>,
    out_shape: &[usize],
    src_strides: &[usize],
    base: usize,
) -> Result<Tensor<T>, TensorOpsError> {
    let len: usize = out_shape.iter().product();
    let mut out = Vec::with_capacity(len);
    if len > 0 {
        let pin = data.pin();
        let buffer = pin.buffer();
        let mut idx = vec![0; out_shape.len()];
        for _ in 0..len {
            let offset = base
                + idx
                    .iter()
                    .zip(src_strides.iter())
                    .map(|(i, s)| i * s)
                    .sum::<usize>();
            out.push(buffer[offset]);
            increment_index(&mut idx, out_shape);
        }
    }
    Ok(Tensor::from_shape_vec(out_shape, out)?)
}

/// Permute the axes of `data`.
///
/// `perm` defaults to reversing the axes. A tensor of rank 0 or 1 is returned as a copy.
///
/// # Errors
///
/// [`TensorOpsError::RankMismatch`] if `perm` does not name every axis,
/// [`TensorOpsError::AxisOutOfRange`] and [`TensorOpsError::RepeatedAxis`] for invalid
/// entries.
///
/// # Example
///
/// ```
/// use onyx_tensor::{Tensor, TensorAccess};
/// use onyx_tensor_ops::views::transpose;
///
/// let x = Tensor::<i32>::from_shape_vec(&[2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
/// let y = transpose(&x, None).unwrap();
/// assert_eq!(y.shape(), &[3, 2]);
/// assert_eq!(y.to_vec(), vec![1, 4, 2, 5, 3, 6]);
/// ```
pub fn transpose<T: TensorElement>(
    data: &Tensor<T>,
    perm: Option<&[i64]>,
) -> Result<Tensor<T>, TensorOpsError> {
    let rank = data.rank();
    let perm = match perm {
        Some(p) => {
            if p.len() != rank {
                return Err(TensorOpsError::rank_mismatch("transpose", rank, p.len()));
            }
            normalize_axes(p, rank)?
        }
        None => (0..rank).rev().collect(),
    };
    if rank <= 1 {
        return Ok(Tensor::Dense(data.to_dense()));
    }

    let shape = data.shape();
    let strides = data.storage_strides();
    let out_shape: Vec<usize> = perm.iter().map(|&p| shape[p]).collect();
    let src_strides: Vec<usize> = perm.iter().map(|&p| strides[p]).collect();
    collect_strided(data, &out_shape, &src_strides, 0)
}

fn clamp_bound(value: i64, dim: usize) -> usize {
    let dim_i = dim as i64;
    let v = if value < 0 { value + dim_i } else { value };
    v.clamp(0, dim_i) as usize
}

/// Extract a strided sub-range along selected axes.
///
/// `starts` and `ends` are normalized for negative values and then clamped into
/// `[0, dim]`; axes not named in `axes` (default `0..starts.len()`) keep their full range
/// and `steps` defaults to 1.
///
/// # Errors
///
/// - [`TensorOpsError::RankMismatch`] for rank-0 data.
/// - [`TensorOpsError::InvalidArgument`] for mismatched argument lengths or a zero step.
/// - [`TensorError::UnsupportedOperation`] for negative steps.
pub fn slice<T: TensorElement>(
    data: &Tensor<T>,
    starts: &[i64],
    ends: &[i64],
    axes: Option<&[i64]>,
    steps: Option<&[i64]>,
) -> Result<Tensor<T>, TensorOpsError> {
    let rank = data.rank();
    if rank == 0 {
        return Err(TensorOpsError::rank_mismatch("slice", ">= 1", 0));
    }
    if starts.len() != ends.len() {
        return Err(TensorOpsError::InvalidArgument(format!(
            "slice has {} starts but {} ends",
            starts.len(),
            ends.len()
        )));
    }
    let axes = match axes {
        Some(a) if a.len() != starts.len() => {
            return Err(TensorOpsError::InvalidArgument(format!(
                "slice has {} starts but {} axes",
                starts.len(),
                a.len()
            )));
        }
        Some(a) => normalize_axes(a, rank)?,
        None => {
            let all: Vec<i64> = (0..starts.len() as i64).collect();
            normalize_axes(&all, rank)?
        }
    };
    let steps = match steps {
        Some(s) if s.len() != starts.len() => {
            return Err(TensorOpsError::InvalidArgument(format!(
                "slice has {} starts but {} steps",
                starts.len(),
                s.len()
            )));
        }
        Some(s) => s.to_vec(),
        None => vec![1; starts.len()],
    };

    let shape = data.shape();
    let mut begin = vec![0usize; rank];
    let mut out_shape = shape.to_vec();
    let mut step = vec![1usize; rank];
    for (i, &a) in axes.iter().enumerate() {
        match steps[i] {
            0 => {
                return Err(TensorOpsError::InvalidArgument(
                    "slice step cannot be 0".to_string(),
                ))
            }
            s if s < 0 => {
                return Err(TensorError::unsupported_operation(
                    "slice",
                    format!("negative step {s} on axis {a}"),
                )
                .into())
            }
            s => step[a] = s as usize,
        }
        let start = clamp_bound(starts[i], shape[a]);
        let end = clamp_bound(ends[i], shape[a]);
        begin[a] = start;
        out_shape[a] = if end > start {
            (end - start).div_ceil(step[a])
        } else {
            0
        };
    }

    if out_shape.contains(&0) {
        return Ok(Tensor::zeros(&out_shape));
    }
    let strides = data.storage_strides();
    let base = data.storage_offset(&begin)?;
    let src_strides: Vec<usize> = strides.iter().zip(step.iter()).map(|(s, k)| s * k).collect();
    collect_strided(data, &out_shape, &src_strides, base)
}

/// Join tensors along `axis`.
///
/// # Errors
///
/// [`TensorOpsError::RankMismatch`] if the ranks differ and
/// [`TensorOpsError::ShapeMismatch`] if any non-axis size differs.
pub fn concat<T: TensorElement>(
    tensors: &[&Tensor<T>],
    axis: i64,
) -> Result<Tensor<T>, TensorOpsError> {
    let Some(first) = tensors.first() else {
        return Err(TensorOpsError::InvalidArgument(
            "concat needs at least one input".to_string(),
        ));
    };
    let rank = first.rank();
    let ax = resolve_axis(axis, rank)?;
    for t in tensors.iter().skip(1) {
        if t.rank() != rank {
            return Err(TensorOpsError::rank_mismatch("concat", rank, t.rank()));
        }
        let same = (0..rank).all(|i| i == ax || t.shape()[i] == first.shape()[i]);
        if !same {
            return Err(TensorOpsError::ShapeMismatch(
                first.shape().to_vec(),
                t.shape().to_vec(),
            ));
        }
    }

    let mut out_shape = first.shape().to_vec();
    out_shape[ax] = tensors.iter().map(|t| t.shape()[ax]).sum();
    let outer: usize = out_shape[..ax].iter().product();
    let inner: usize = out_shape[ax + 1..].iter().product();

    let values: Vec<Vec<T>> = tensors.iter().map(|t| t.contiguous().to_vec()).collect();
    let mut out = Vec::with_capacity(out_shape.iter().product());
    for o in 0..outer {
        for (t, v) in tensors.iter().zip(values.iter()) {
            let run = t.shape()[ax] * inner;
            out.extend_from_slice(&v[o * run..(o + 1) * run]);
        }
    }
    Ok(Tensor::from_shape_vec(&out_shape, out)?)
}

/// Select entries along `axis` by index.
///
/// The output shape is `data.shape[..axis] ++ indices.shape ++ data.shape[axis + 1..]`.
/// Negative indices count from the end of the axis.
///
/// # Errors
///
/// [`TensorError::IndexOutOfRange`] for an index outside the axis, reported before any
/// output is produced.
///
/// # Example
///
/// ```
/// use onyx_tensor::{Tensor, TensorAccess};
/// use onyx_tensor_ops::views::gather;
///
/// let data = Tensor::<f32>::from_shape_vec(&[3, 2], vec![1.0, 1.2, 2.3, 3.4, 4.5, 5.7]).unwrap();
/// let indices = Tensor::<i64>::from_shape_vec(&[2, 2], vec![0, 1, 1, -1]).unwrap();
/// let out = gather(&data, &indices, 0).unwrap();
/// assert_eq!(out.shape(), &[2, 2, 2]);
/// assert_eq!(out.to_vec(), vec![1.0, 1.2, 2.3, 3.4, 2.3, 3.4, 4.5, 5.7]);
/// ```
pub fn gather<T: TensorElement>(
    data: &Tensor<T>,
    indices: &Tensor<i64>,
    axis: i64,
) -> Result<Tensor<T>, TensorOpsError> {
    let rank = data.rank();
    let ax = resolve_axis(axis, rank)?;
    let shape = data.shape();
    let dim = shape[ax];

    let picks = indices
        .contiguous()
        .to_vec()
        .into_iter()
        .map(|i| {
            let n = if i < 0 { i + dim as i64 } else { i };
            if n < 0 || n >= dim as i64 {
                Err(TensorError::index_out_of_range(i.unsigned_abs() as usize, dim))
            } else {
                Ok(n as usize)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut out_shape = shape[..ax].to_vec();
    out_shape.extend_from_slice(indices.shape());
    out_shape.extend_from_slice(&shape[ax + 1..]);

    let outer: usize = shape[..ax].iter().product();
    let inner: usize = shape[ax + 1..].iter().product();
    let values = data.contiguous().to_vec();
    let mut out = Vec::with_capacity(outer * picks.len() * inner);
    for o in 0..outer {
        for &p in &picks {
            let start = (o * dim + p) * inner;
            out.extend_from_slice(&values[start..start + inner]);
        }
    }
    Ok(Tensor::from_shape_vec(&out_shape, out)?)
}

/// Resolve a requested shape against the input shape.
///
/// `-1` (at most once) is inferred from the remaining sizes and `0` copies the input size
/// at the same position unless `allow_zero` is set.
pub fn resolve_reshape(
    input: &[usize],
    requested: &[i64],
    allow_zero: bool,
) -> Result<Vec<usize>, TensorOpsError> {
    let total: usize = input.iter().product();
    let mut infer = None;
    let mut dims = Vec::with_capacity(requested.len());
    for (i, &d) in requested.iter().enumerate() {
        match d {
            -1 if infer.is_some() => {
                return Err(TensorOpsError::InvalidArgument(
                    "reshape allows at most one -1".to_string(),
                ))
            }
            -1 => {
                infer = Some(i);
                dims.push(1);
            }
            0 if !allow_zero => match input.get(i) {
                Some(&size) => dims.push(size),
                None => {
                    return Err(TensorOpsError::InvalidArgument(format!(
                        "reshape dimension {i} is 0 but the input has rank {}",
                        input.len()
                    )))
                }
            },
            d if d < -1 => {
                return Err(TensorOpsError::InvalidArgument(format!(
                    "invalid reshape dimension {d}"
                )))
            }
            d => dims.push(d as usize),
        }
    }

    if let Some(i) = infer {
        let known: usize = dims.iter().product();
        if known == 0 || total % known != 0 {
            return Err(TensorError::invalid_shape(total, known).into());
        }
        dims[i] = total / known;
    }

    let new_total: usize = dims.iter().product();
    if new_total != total {
        return Err(TensorError::invalid_shape(total, new_total).into());
    }
    Ok(dims)
}

/// Give `data` a new shape with the same number of elements.
///
/// The result shares the input buffer when `data` is a row-major dense tensor.
///
/// # Errors
///
/// [`TensorError::InvalidShape`] when the element count changes and
/// [`TensorOpsError::InvalidArgument`] for malformed sizes.
pub fn reshape<T: TensorElement>(
    data: &Tensor<T>,
    shape: &[i64],
    allow_zero: bool,
) -> Result<Tensor<T>, TensorOpsError> {
    let dims = resolve_reshape(data.shape(), shape, allow_zero)?;
    Ok(Tensor::Dense(data.contiguous().reshape(&dims)?))
}

/// Insert size-1 axes at `axes`, normalized against the output rank.
///
/// Works on broadcast views as well as dense tensors, without copying.
pub fn unsqueeze<T: TensorElement>(
    data: &Tensor<T>,
    axes: &[i64],
) -> Result<Tensor<T>, TensorOpsError> {
    let out_rank = data.rank() + axes.len();
    let mut axes = normalize_axes(axes, out_rank)?;
    axes.sort_unstable();

    let mut out = data.share();
    for a in axes {
        out = out.insert_dim(a)?;
    }
    Ok(out)
}

/// Remove size-1 axes: the listed ones, or every size-1 axis when `axes` is `None`.
///
/// # Errors
///
/// [`TensorOpsError::InvalidArgument`] when a listed axis is not of size 1.
pub fn squeeze<T: TensorElement>(
    data: &Tensor<T>,
    axes: Option<&[i64]>,
) -> Result<Tensor<T>, TensorOpsError> {
    let shape = data.shape();
    let mut axes = match axes {
        Some(a) => {
            let axes = normalize_axes(a, data.rank())?;
            if let Some(&bad) = axes.iter().find(|&&a| shape[a] != 1) {
                return Err(TensorOpsError::InvalidArgument(format!(
                    "cannot squeeze axis {bad} of size {}",
                    shape[bad]
                )));
            }
            axes
        }
        None => (0..shape.len()).filter(|&a| shape[a] == 1).collect(),
    };
    axes.sort_unstable_by(|a, b| b.cmp(a));

    let mut out = data.share();
    for a in axes {
        out = out.remove_dim(a)?;
    }
    Ok(out)
}
