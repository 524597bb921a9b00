use crate::error::TensorError;

/// Memory layout convention used to derive strides from a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StrideOrder {
    /// The last axis has stride 1 (C order).
    #[default]
    RowMajor,
    /// The first axis has stride 1 (Fortran order).
    Reversed,
}

/// Compute the strides of a contiguous buffer with the given shape.
///
/// # Arguments
///
/// * `shape` - The size of each axis.
/// * `order` - The stride convention.
///
/// # Returns
///
/// One stride per axis. A rank-0 shape yields an empty vector.
pub fn get_strides_from_shape(shape: &[usize], order: StrideOrder) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;
    match order {
        StrideOrder::RowMajor => {
            for i in (0..shape.len()).rev() {
                strides[i] = stride;
                stride *= shape[i];
            }
        }
        StrideOrder::Reversed => {
            for i in 0..shape.len() {
                strides[i] = stride;
                stride *= shape[i];
            }
        }
    }
    strides
}

/// Number of elements addressed by `shape`; a rank-0 shape holds one scalar.
pub fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Decompose a linear index into a multi-index under the given strides.
pub fn unravel_index(index: usize, shape: &[usize], strides: &[usize]) -> Vec<usize> {
    shape
        .iter()
        .zip(strides.iter())
        .map(|(&dim, &stride)| {
            if dim == 0 || stride == 0 {
                0
            } else {
                (index / stride) % dim
            }
        })
        .collect()
}

/// Linear offset of `index` under `strides`, without bounds checks.
pub fn ravel_index(index: &[usize], strides: &[usize]) -> usize {
    index
        .iter()
        .zip(strides.iter())
        .map(|(&i, &s)| i * s)
        .sum()
}

/// Validate a multi-index against a shape.
///
/// A single `[0]` index into a rank-0 shape addresses the scalar and is accepted.
pub fn check_index(index: &[usize], shape: &[usize]) -> Result<(), TensorError> {
    if shape.is_empty() {
        return match index {
            [] => Ok(()),
            [0] => Ok(()),
            [i] => Err(TensorError::index_out_of_range(*i, 1)),
            _ => Err(TensorError::RankMismatch {
                expected: 0,
                actual: index.len(),
            }),
        };
    }

    if index.len() != shape.len() {
        return Err(TensorError::RankMismatch {
            expected: shape.len(),
            actual: index.len(),
        });
    }

    for (&i, &dim) in index.iter().zip(shape.iter()) {
        if i >= dim {
            return Err(TensorError::index_out_of_range(i, dim));
        }
    }

    Ok(())
}

/// Advance a row-major multi-index by one position.
///
/// Returns `false` once the index wraps around past the last element.
pub fn increment_index(index: &mut [usize], shape: &[usize]) -> bool {
    for dim in (0..shape.len()).rev() {
        index[dim] += 1;
        if index[dim] < shape[dim] {
            return true;
        }
        index[dim] = 0;
    }
    false
}

/// Resolve a possibly negative axis against `rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Option<usize> {
    let rank_i = rank as i64;
    let resolved = if axis < 0 { axis + rank_i } else { axis };
    if resolved < 0 || resolved >= rank_i {
        None
    } else {
        Some(resolved as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides_row_major() {
        assert_eq!(
            get_strides_from_shape(&[2, 3, 4], StrideOrder::RowMajor),
            vec![12, 4, 1]
        );
        assert!(get_strides_from_shape(&[], StrideOrder::RowMajor).is_empty());
    }

    #[test]
    fn test_strides_reversed() {
        assert_eq!(
            get_strides_from_shape(&[2, 3, 4], StrideOrder::Reversed),
            vec![1, 2, 6]
        );
    }

    #[test]
    fn test_unravel_matches_ravel() {
        let shape = [2, 3, 4];
        for order in [StrideOrder::RowMajor, StrideOrder::Reversed] {
            let strides = get_strides_from_shape(&shape, order);
            for i in 0..num_elements(&shape) {
                let idx = unravel_index(i, &shape, &strides);
                assert_eq!(ravel_index(&idx, &strides), i);
            }
        }
    }

    #[test]
    fn test_odometer_visits_every_position() {
        let shape = [2, 3];
        let mut idx = vec![0, 0];
        let mut visited = 1;
        while increment_index(&mut idx, &shape) {
            visited += 1;
        }
        assert_eq!(visited, 6);
        assert_eq!(idx, vec![0, 0]);
    }

    #[test]
    fn test_check_index_rank_zero() -> Result<(), TensorError> {
        check_index(&[0], &[])?;
        check_index(&[], &[])?;
        assert_eq!(
            check_index(&[1], &[]),
            Err(TensorError::index_out_of_range(1, 1))
        );
        Ok(())
    }

    #[test]
    fn test_check_index_errors() {
        assert!(matches!(
            check_index(&[0], &[2, 2]),
            Err(TensorError::RankMismatch { .. })
        ));
        assert_eq!(
            check_index(&[0, 2], &[2, 2]),
            Err(TensorError::index_out_of_range(2, 2))
        );
    }

    #[test]
    fn test_negative_axes() {
        assert_eq!(normalize_axis(-1, 3), Some(2));
        assert_eq!(normalize_axis(2, 3), Some(2));
        assert_eq!(normalize_axis(3, 3), None);
        assert_eq!(normalize_axis(-4, 3), None);
    }
}
