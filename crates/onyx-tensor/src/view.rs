use crate::{
    dense::DenseTensor,
    element::TensorElement,
    error::TensorError,
    shape::{check_index, get_strides_from_shape, increment_index, num_elements, ravel_index},
    tensor::{Tensor, TensorAccess},
};

/// A zero-copy expansion of a dense tensor along one or more size-1 axes.
///
/// The view keeps a shared handle to its source, so the source buffer outlives the
/// view. Reads and writes are remapped onto the source: every position along a
/// broadcast axis aliases the single source element, so a write through the view is
/// visible through the source and through every other position of that axis.
///
/// The view and its source always have the same rank; `broadcast_dims` lists the view
/// axes whose source size is 1.
#[derive(Debug)]
pub struct BroadcastView<T> {
    source: DenseTensor<T>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    // source strides with 0 on broadcast axes
    storage_strides: Vec<usize>,
    broadcast_dims: Vec<usize>,
}

impl<T: TensorElement> BroadcastView<T> {
    pub(crate) fn new(source: DenseTensor<T>, dim: usize, size: usize) -> Self {
        let mut shape = source.shape.clone();
        shape[dim] = size;
        Self::from_parts(source, shape, vec![dim])
    }

    fn from_parts(source: DenseTensor<T>, shape: Vec<usize>, broadcast_dims: Vec<usize>) -> Self {
        let strides = get_strides_from_shape(&shape, source.order);
        let storage_strides = source
            .strides
            .iter()
            .enumerate()
            .map(|(axis, &s)| if broadcast_dims.contains(&axis) { 0 } else { s })
            .collect();
        Self {
            source,
            shape,
            strides,
            storage_strides,
            broadcast_dims,
        }
    }

    /// The dense tensor this view reads from.
    pub fn source(&self) -> &DenseTensor<T> {
        &self.source
    }

    /// Axes of the view that expand a size-1 source axis.
    pub fn broadcast_dims(&self) -> &[usize] {
        &self.broadcast_dims
    }

    /// Source strides with 0 on every broadcast axis.
    pub fn storage_strides(&self) -> &[usize] {
        &self.storage_strides
    }

    /// Buffer offset of a multi-index, without bounds checks.
    pub(crate) fn storage_offset_unchecked(&self, index: &[usize]) -> usize {
        ravel_index(index, &self.storage_strides)
    }

    /// Buffer position of the element at linear index `index` of the view.
    pub(crate) fn source_index(&self, index: usize) -> usize {
        let mut offset = 0;
        for axis in 0..self.shape.len() {
            let stride = self.strides[axis];
            let dim = self.shape[axis];
            if stride == 0 || dim == 0 {
                continue;
            }
            offset += ((index / stride) % dim) * self.storage_strides[axis];
        }
        offset
    }

    fn check_linear(&self, index: usize) -> Result<(), TensorError> {
        let len = num_elements(&self.shape);
        if index >= len {
            return Err(TensorError::index_out_of_range(index, len));
        }
        Ok(())
    }

    /// Inserts a size-1 axis at `dim`; broadcast axes at or after it shift by one.
    pub fn insert_dim(&self, dim: usize) -> Result<Self, TensorError> {
        let source = self.source.insert_dim(dim)?;
        let mut shape = self.shape.clone();
        shape.insert(dim, 1);
        let broadcast_dims = self
            .broadcast_dims
            .iter()
            .map(|&d| if d >= dim { d + 1 } else { d })
            .collect();
        Ok(Self::from_parts(source, shape, broadcast_dims))
    }

    /// Removes the size-1 axis at `dim`.
    ///
    /// Returns the dense source when no broadcast axis remains.
    pub fn remove_dim(&self, dim: usize) -> Result<Tensor<T>, TensorError> {
        if dim >= self.shape.len() {
            return Err(TensorError::axis_out_of_range(dim, self.shape.len()));
        }
        if self.shape[dim] != 1 {
            return Err(TensorError::shape_mismatch(
                format!("cannot remove axis {dim} of size {}", self.shape[dim]),
                &[1],
                &[self.shape[dim]],
            ));
        }

        let source = self.source.remove_dim(dim)?;
        let broadcast_dims: Vec<usize> = self
            .broadcast_dims
            .iter()
            .filter(|&&d| d != dim)
            .map(|&d| if d > dim { d - 1 } else { d })
            .collect();

        if broadcast_dims.is_empty() {
            return Ok(Tensor::Dense(source));
        }

        let mut shape = self.shape.clone();
        shape.remove(dim);
        Ok(Tensor::Broadcast(Self::from_parts(
            source,
            shape,
            broadcast_dims,
        )))
    }

    /// Expands another size-1 axis of the view.
    pub fn broadcast_dim(&self, dim: usize, size: usize) -> Result<Self, TensorError> {
        if dim >= self.shape.len() {
            return Err(TensorError::axis_out_of_range(dim, self.shape.len()));
        }
        if self.shape[dim] != 1 {
            return Err(TensorError::shape_mismatch(
                format!("cannot broadcast axis {dim} of size {}", self.shape[dim]),
                &[1],
                &[self.shape[dim]],
            ));
        }

        let mut broadcast_dims = self.broadcast_dims.clone();
        if !broadcast_dims.contains(&dim) {
            broadcast_dims.push(dim);
            broadcast_dims.sort_unstable();
        }
        let mut shape = self.shape.clone();
        shape[dim] = size;
        Ok(Self::from_parts(self.source.share(), shape, broadcast_dims))
    }

    /// Materializes the view into an independent row-major dense tensor.
    pub fn to_dense(&self) -> DenseTensor<T> {
        let numel = num_elements(&self.shape);
        let mut data = Vec::with_capacity(numel);
        let mut idx = vec![0; self.shape.len()];
        let buffer = self.source.storage.read();
        for _ in 0..numel {
            data.push(buffer[self.storage_offset_unchecked(&idx)]);
            increment_index(&mut idx, &self.shape);
        }
        drop(buffer);
        DenseTensor::from_row_major_parts(&self.shape, data)
    }
}

impl<T: TensorElement> Clone for BroadcastView<T> {
    /// Creates a new view over the same source buffer.
    fn clone(&self) -> Self {
        Self {
            source: self.source.share(),
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            storage_strides: self.storage_strides.clone(),
            broadcast_dims: self.broadcast_dims.clone(),
        }
    }
}

impl<T: TensorElement> TensorAccess<T> for BroadcastView<T> {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn strides(&self) -> &[usize] {
        &self.strides
    }

    fn get_value(&self, index: usize) -> Result<T, TensorError> {
        self.check_linear(index)?;
        let pos = self.source_index(index);
        self.source.get_value(pos)
    }

    fn set_value(&mut self, index: usize, value: T) -> Result<(), TensorError> {
        self.check_linear(index)?;
        let pos = self.source_index(index);
        self.source.set_value(pos, value)
    }

    fn get(&self, index: &[usize]) -> Result<T, TensorError> {
        check_index(index, &self.shape)?;
        self.source.get_value(self.storage_offset_unchecked(index))
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), TensorError> {
        check_index(index, &self.shape)?;
        let pos = self.storage_offset_unchecked(index);
        self.source.set_value(pos, value)
    }
}
