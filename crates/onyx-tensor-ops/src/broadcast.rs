use onyx_tensor::{Tensor, TensorAccess, TensorElement};

use crate::error::TensorOpsError;

/// Broadcast two tensors to a common shape (NumPy rules).
///
/// Shapes are aligned from the right. Missing leading axes are inserted with
/// `insert_dim` and expanded with `broadcast_dim`; an axis of size 1 facing any other
/// size is expanded to it; any other mismatch fails. Identical shapes return both
/// operands unchanged, and a rank-0 operand facing a non-scalar becomes a dense tensor
/// of the other's shape filled with its value.
///
/// No data is copied except in the rank-0 case; the results share the input buffers.
///
/// # Returns
///
/// `None` when the shapes are incompatible.
///
/// # Example
///
/// ```
/// use onyx_tensor::{Tensor, TensorAccess};
/// use onyx_tensor_ops::broadcast::broadcast;
///
/// let a = Tensor::<f32>::zeros(&[3, 1]);
/// let b = Tensor::<f32>::zeros(&[4]);
/// let (ba, bb) = broadcast(&a, &b).unwrap();
/// assert_eq!(ba.shape(), &[3, 4]);
/// assert_eq!(bb.shape(), &[3, 4]);
/// ```
pub fn broadcast<T: TensorElement>(a: &Tensor<T>, b: &Tensor<T>) -> Option<(Tensor<T>, Tensor<T>)> {
    if a.shape() == b.shape() {
        return Some((a.share(), b.share()));
    }
    if a.rank() == 0 {
        return Some((fill_scalar(a, b.shape())?, b.share()));
    }
    if b.rank() == 0 {
        return Some((a.share(), fill_scalar(b, a.shape())?));
    }

    let rank = a.rank().max(b.rank());
    let (lead_a, lead_b) = (rank - a.rank(), rank - b.rank());
    let mut out_a = a.share();
    let mut out_b = b.share();

    for i in 0..rank {
        if i < lead_a {
            let size = b.shape()[i - lead_b];
            out_a = out_a.insert_dim(i).ok()?.broadcast_dim(i, size).ok()?;
            continue;
        }
        if i < lead_b {
            let size = a.shape()[i - lead_a];
            out_b = out_b.insert_dim(i).ok()?.broadcast_dim(i, size).ok()?;
            continue;
        }

        let dim_a = a.shape()[i - lead_a];
        let dim_b = b.shape()[i - lead_b];
        if dim_a == dim_b {
            continue;
        } else if dim_a == 1 {
            out_a = out_a.broadcast_dim(i, dim_b).ok()?;
        } else if dim_b == 1 {
            out_b = out_b.broadcast_dim(i, dim_a).ok()?;
        } else {
            return None;
        }
    }

    Some((out_a, out_b))
}

fn fill_scalar<T: TensorElement>(scalar: &Tensor<T>, shape: &[usize]) -> Option<Tensor<T>> {
    let value = scalar.get_value(0).ok()?;
    Some(Tensor::from_shape_val(shape, value))
}

/// Broadcast `x` to exactly `shape`.
///
/// Returns `None` when `x` cannot be expanded to `shape`, including when the common
/// shape of the two would be larger than `shape`.
pub fn broadcast_to<T: TensorElement>(x: &Tensor<T>, shape: &[usize]) -> Option<Tensor<T>> {
    if broadcast_shape(x.shape(), shape)? != shape {
        return None;
    }
    if x.shape() == shape {
        return Some(x.share());
    }
    if x.rank() == 0 {
        return fill_scalar(x, shape);
    }

    let lead = shape.len() - x.rank();
    let mut out = x.share();
    for (i, &size) in shape.iter().enumerate() {
        if i < lead {
            out = out.insert_dim(i).ok()?.broadcast_dim(i, size).ok()?;
        } else if x.shape()[i - lead] != size {
            out = out.broadcast_dim(i, size).ok()?;
        }
    }
    Some(out)
}

/// The common shape of two shapes, agreeing exactly with [`broadcast`].
///
/// # Example
///
/// ```
/// use onyx_tensor_ops::broadcast::broadcast_shape;
///
/// assert_eq!(broadcast_shape(&[2, 1, 4], &[3, 1]), Some(vec![2, 3, 4]));
/// assert_eq!(broadcast_shape(&[2, 3], &[4, 3]), None);
/// ```
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    if a == b || b.is_empty() {
        return Some(a.to_vec());
    }
    if a.is_empty() {
        return Some(b.to_vec());
    }

    let rank = a.len().max(b.len());
    let (lead_a, lead_b) = (rank - a.len(), rank - b.len());
    (0..rank)
        .map(|i| {
            if i < lead_a {
                return Some(b[i - lead_b]);
            }
            if i < lead_b {
                return Some(a[i - lead_a]);
            }
            let (dim_a, dim_b) = (a[i - lead_a], b[i - lead_b]);
            if dim_a == dim_b || dim_b == 1 {
                Some(dim_a)
            } else if dim_a == 1 {
                Some(dim_b)
            } else {
                None
            }
        })
        .collect()
}

/// [`broadcast`], reporting incompatible shapes as an error.
pub fn try_broadcast<T: TensorElement>(
    a: &Tensor<T>,
    b: &Tensor<T>,
) -> Result<(Tensor<T>, Tensor<T>), TensorOpsError> {
    broadcast(a, b).ok_or_else(|| {
        TensorOpsError::BroadcastIncompatible(a.shape().to_vec(), b.shape().to_vec())
    })
}
