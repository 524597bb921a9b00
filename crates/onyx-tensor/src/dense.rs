use crate::{
    element::TensorElement,
    error::TensorError,
    shape::{
        check_index, get_strides_from_shape, increment_index, num_elements, ravel_index,
        StrideOrder,
    },
    storage::TensorStorage,
    tensor::TensorAccess,
    view::BroadcastView,
};

/// A tensor backed by one contiguous buffer.
///
/// The linear index of an element equals its position in the buffer; the stride
/// order only decides how multi-indices map onto that buffer. View operations
/// (`reshape`, `insert_dim`, `remove_dim`) return new tensors sharing the same buffer.
/// [`Clone`] performs a deep copy.
///
/// # Example
///
/// ```rust
/// use onyx_tensor::{DenseTensor, TensorAccess};
///
/// let t = DenseTensor::<f32>::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
/// assert_eq!(t.get(&[1, 2]).unwrap(), 6.0);
///
/// let r = t.reshape(&[3, 2]).unwrap();
/// assert_eq!(r.get(&[2, 1]).unwrap(), 6.0);
/// ```
#[derive(Debug)]
pub struct DenseTensor<T> {
    pub(crate) storage: TensorStorage<T>,
    pub(crate) shape: Vec<usize>,
    pub(crate) strides: Vec<usize>,
    pub(crate) order: StrideOrder,
}

impl<T: TensorElement> DenseTensor<T> {
    /// Creates a row-major tensor from a shape and a vector of data.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] if `data.len()` differs from the product of `shape`.
    pub fn from_shape_vec(shape: &[usize], data: Vec<T>) -> Result<Self, TensorError> {
        Self::from_shape_vec_with_order(shape, data, StrideOrder::RowMajor)
    }

    /// Creates a tensor from a shape and data laid out under `order`.
    pub fn from_shape_vec_with_order(
        shape: &[usize],
        data: Vec<T>,
        order: StrideOrder,
    ) -> Result<Self, TensorError> {
        let numel = num_elements(shape);
        if numel != data.len() {
            return Err(TensorError::invalid_shape(numel, data.len()));
        }
        Ok(Self {
            storage: TensorStorage::from_vec(data),
            shape: shape.to_vec(),
            strides: get_strides_from_shape(shape, order),
            order,
        })
    }

    /// Creates a row-major tensor filled with `value`.
    pub fn from_shape_val(shape: &[usize], value: T) -> Self {
        Self::from_row_major_parts(shape, vec![value; num_elements(shape)])
    }

    /// Creates a row-major tensor by evaluating `f` at every multi-index.
    pub fn from_shape_fn<F>(shape: &[usize], f: F) -> Self
    where
        F: Fn(&[usize]) -> T,
    {
        let numel = num_elements(shape);
        let mut data = Vec::with_capacity(numel);
        let mut idx = vec![0; shape.len()];
        for _ in 0..numel {
            data.push(f(&idx));
            increment_index(&mut idx, shape);
        }
        Self::from_row_major_parts(shape, data)
    }

    /// Creates a row-major tensor filled with zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_shape_val(shape, T::zero())
    }

    /// Creates a rank-0 tensor holding a single value.
    pub fn scalar(value: T) -> Self {
        Self::from_shape_val(&[], value)
    }

    /// The stride convention fixed at construction.
    pub fn stride_order(&self) -> StrideOrder {
        self.order
    }

    /// Returns true for the row-major convention.
    pub fn is_row_major(&self) -> bool {
        self.order == StrideOrder::RowMajor
    }

    /// The underlying storage handle.
    pub fn storage(&self) -> &TensorStorage<T> {
        &self.storage
    }

    /// Returns a new handle to the same buffer with the same shape.
    pub fn share(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            order: self.order,
        }
    }

    /// Copies the elements out in linear (buffer) order.
    pub fn to_vec(&self) -> Vec<T> {
        self.storage.read().clone()
    }

    /// Buffer offset of a validated multi-index.
    pub fn offset_of(&self, index: &[usize]) -> Result<usize, TensorError> {
        check_index(index, &self.shape)?;
        if self.shape.is_empty() {
            return Ok(0);
        }
        Ok(ravel_index(index, &self.strides))
    }

    fn with_shape(&self, shape: Vec<usize>) -> Self {
        Self {
            storage: self.storage.clone(),
            strides: get_strides_from_shape(&shape, self.order),
            shape,
            order: self.order,
        }
    }

    /// Reinterprets the buffer with a new shape, sharing storage.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::InvalidShape`] when the element count changes.
    pub fn reshape(&self, dims: &[usize]) -> Result<Self, TensorError> {
        let numel = num_elements(dims);
        if numel != self.len() {
            return Err(TensorError::invalid_shape(self.len(), numel));
        }
        Ok(self.with_shape(dims.to_vec()))
    }

    /// Inserts a size-1 axis at position `dim`, sharing storage.
    pub fn insert_dim(&self, dim: usize) -> Result<Self, TensorError> {
        if dim > self.rank() {
            return Err(TensorError::axis_out_of_range(dim, self.rank()));
        }
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        Ok(self.with_shape(shape))
    }

    /// Removes the size-1 axis at position `dim`, sharing storage.
    pub fn remove_dim(&self, dim: usize) -> Result<Self, TensorError> {
        if dim >= self.rank() {
            return Err(TensorError::axis_out_of_range(dim, self.rank()));
        }
        if self.shape[dim] != 1 {
            return Err(TensorError::shape_mismatch(
                format!("cannot remove axis {dim} of size {}", self.shape[dim]),
                &[1],
                &[self.shape[dim]],
            ));
        }
        let mut shape = self.shape.clone();
        shape.remove(dim);
        Ok(self.with_shape(shape))
    }

    /// Expands the size-1 axis `dim` to `size` without copying.
    pub fn broadcast_dim(&self, dim: usize, size: usize) -> Result<BroadcastView<T>, TensorError> {
        if dim >= self.rank() {
            return Err(TensorError::axis_out_of_range(dim, self.rank()));
        }
        if self.shape[dim] != 1 {
            return Err(TensorError::shape_mismatch(
                format!("cannot broadcast axis {dim} of size {}", self.shape[dim]),
                &[1],
                &[self.shape[dim]],
            ));
        }
        Ok(BroadcastView::new(self.share(), dim, size))
    }

    /// Materializes an independent row-major copy.
    pub fn to_row_major(&self) -> Self {
        if self.is_row_major() {
            return self.clone();
        }

        let numel = self.len();
        let mut data = Vec::with_capacity(numel);
        let mut idx = vec![0; self.rank()];
        let buffer = self.storage.read();
        for _ in 0..numel {
            data.push(buffer[ravel_index(&idx, &self.strides)]);
            increment_index(&mut idx, &self.shape);
        }
        drop(buffer);

        Self::from_row_major_parts(&self.shape, data)
    }

    // callers guarantee data.len() matches the shape
    pub(crate) fn from_row_major_parts(shape: &[usize], data: Vec<T>) -> Self {
        Self {
            storage: TensorStorage::from_vec(data),
            shape: shape.to_vec(),
            strides: get_strides_from_shape(shape, StrideOrder::RowMajor),
            order: StrideOrder::RowMajor,
        }
    }
}

impl<T: TensorElement> Clone for DenseTensor<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.deep_clone(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            order: self.order,
        }
    }
}

impl<T: TensorElement> TensorAccess<T> for DenseTensor<T> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn strides(&self) -> &[usize] {
        &self.strides
    }

    fn get_value(&self, index: usize) -> Result<T, TensorError> {
        let buffer = self.storage.read();
        buffer
            .get(index)
            .copied()
            .ok_or_else(|| TensorError::index_out_of_range(index, buffer.len()))
    }

    fn set_value(&mut self, index: usize, value: T) -> Result<(), TensorError> {
        let mut buffer = self.storage.write();
        let len = buffer.len();
        let slot = buffer
            .get_mut(index)
            .ok_or_else(|| TensorError::index_out_of_range(index, len))?;
        *slot = value;
        Ok(())
    }

    fn get(&self, index: &[usize]) -> Result<T, TensorError> {
        let offset = self.offset_of(index)?;
        self.get_value(offset)
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), TensorError> {
        let offset = self.offset_of(index)?;
        self.set_value(offset, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_shape_vec() -> Result<(), TensorError> {
        let t = DenseTensor::<u8>::from_shape_vec(&[2, 2], vec![1, 2, 3, 4])?;
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.strides(), &[2, 1]);
        assert_eq!(t.len(), 4);
        assert_eq!(t.get(&[1, 0])?, 3);
        Ok(())
    }

    #[test]
    fn test_from_shape_vec_invalid() {
        let res = DenseTensor::<u8>::from_shape_vec(&[2, 3], vec![1, 2, 3]);
        assert_eq!(res.err(), Some(TensorError::invalid_shape(6, 3)));
    }

    #[test]
    fn test_reversed_order_indexing() -> Result<(), TensorError> {
        let t = DenseTensor::<i32>::from_shape_vec_with_order(
            &[2, 3],
            vec![0, 1, 2, 3, 4, 5],
            StrideOrder::Reversed,
        )?;
        assert_eq!(t.strides(), &[1, 2]);
        assert_eq!(t.get(&[1, 0])?, 1);
        assert_eq!(t.get(&[0, 2])?, 4);
        assert_eq!(t.get_value(5)?, 5);

        let rm = t.to_row_major();
        assert!(rm.is_row_major());
        assert_eq!(rm.to_vec(), vec![0, 2, 4, 1, 3, 5]);
        Ok(())
    }

    #[test]
    fn test_scalar_access() -> Result<(), TensorError> {
        let mut t = DenseTensor::scalar(2.5f64);
        assert_eq!(t.rank(), 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&[0])?, 2.5);
        t.set(&[0], 4.0)?;
        assert_eq!(t.get(&[])?, 4.0);
        Ok(())
    }

    #[test]
    fn test_value_out_of_range() {
        let mut t = DenseTensor::<f32>::zeros(&[3]);
        assert_eq!(t.get_value(3), Err(TensorError::index_out_of_range(3, 3)));
        assert!(t.set_value(4, 1.0).is_err());
        assert!(t.get(&[3]).is_err());
    }

    #[test]
    fn test_from_shape_fn_row_major() {
        let t = DenseTensor::<i64>::from_shape_fn(&[2, 3], |idx| (idx[0] * 10 + idx[1]) as i64);
        assert_eq!(t.to_vec(), vec![0, 1, 2, 10, 11, 12]);
    }

    #[test]
    fn test_reshape_shares_storage() -> Result<(), TensorError> {
        let t = DenseTensor::<f32>::from_shape_vec(&[2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])?;
        let mut r = t.reshape(&[3, 2])?;
        assert!(r.storage().ptr_eq(t.storage()));
        r.set(&[0, 0], 9.0)?;
        assert_eq!(t.get(&[0, 0])?, 9.0);

        assert_eq!(t.reshape(&[4]).err(), Some(TensorError::invalid_shape(6, 4)));
        Ok(())
    }

    #[test]
    fn test_clone_is_deep() -> Result<(), TensorError> {
        let t = DenseTensor::<u8>::from_shape_vec(&[2], vec![1, 2])?;
        let mut c = t.clone();
        c.set_value(0, 5)?;
        assert_eq!(t.get_value(0)?, 1);
        assert!(!c.storage().ptr_eq(t.storage()));
        Ok(())
    }

    #[test]
    fn test_insert_and_remove_dims() -> Result<(), TensorError> {
        let t = DenseTensor::<i32>::from_shape_vec(&[2, 3], vec![1, 2, 3, 4, 5, 6])?;
        let e = t.insert_dim(1)?;
        assert_eq!(e.shape(), &[2, 1, 3]);
        assert_eq!(e.get(&[1, 0, 2])?, 6);
        assert_eq!(e.insert_dim(3)?.shape(), &[2, 1, 3, 1]);
        assert!(matches!(
            t.insert_dim(3),
            Err(TensorError::AxisOutOfRange { axis: 3, rank: 2 })
        ));

        let s = e.remove_dim(1)?;
        assert_eq!(s.shape(), &[2, 3]);
        assert!(matches!(
            t.remove_dim(0),
            Err(TensorError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            t.remove_dim(2),
            Err(TensorError::AxisOutOfRange { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_broadcast_dim_requires_unit_axis() -> Result<(), TensorError> {
        let t = DenseTensor::<f32>::from_shape_vec(&[1, 3], vec![1.0, 2.0, 3.0])?;
        let v = t.broadcast_dim(0, 4)?;
        assert_eq!(v.shape(), &[4, 3]);
        assert!(t.broadcast_dim(1, 4).is_err());
        Ok(())
    }
}
