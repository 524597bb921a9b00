use crate::{
    dense::DenseTensor,
    element::TensorElement,
    error::TensorError,
    shape::{check_index, num_elements, StrideOrder},
    storage::{StorageReadGuard, StorageWriteGuard, TensorStorage},
    view::BroadcastView,
};

/// Element access and shape introspection shared by every tensor variant.
pub trait TensorAccess<T: TensorElement> {
    /// The size of each axis.
    fn shape(&self) -> &[usize];

    /// Per-axis linear-index multipliers.
    fn strides(&self) -> &[usize];

    /// Number of axes.
    fn rank(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements; a rank-0 tensor holds one.
    fn len(&self) -> usize {
        num_elements(self.shape())
    }

    /// Returns true if some axis has size 0.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the element at linear index `index`.
    ///
    /// # Errors
    ///
    /// Returns [`TensorError::IndexOutOfRange`] if `index >= len()`.
    fn get_value(&self, index: usize) -> Result<T, TensorError>;

    /// Writes the element at linear index `index`.
    fn set_value(&mut self, index: usize, value: T) -> Result<(), TensorError>;

    /// Reads the element at a multi-index; every component is bounds-checked.
    fn get(&self, index: &[usize]) -> Result<T, TensorError>;

    /// Writes the element at a multi-index; every component is bounds-checked.
    fn set(&mut self, index: &[usize], value: T) -> Result<(), TensorError>;
}

/// An N-dimensional tensor: either a dense buffer or a broadcast view over one.
///
/// Kernels accept any variant; view operations return new tensors and never mutate
/// shape metadata in place.
///
/// # Example
///
/// ```rust
/// use onyx_tensor::{Tensor, TensorAccess};
///
/// let t = Tensor::<f32>::from_shape_vec(&[1, 3], vec![1.0, 2.0, 3.0]).unwrap();
/// let b = t.broadcast_dim(0, 2).unwrap();
/// assert_eq!(b.shape(), &[2, 3]);
/// assert_eq!(b.get(&[1, 2]).unwrap(), 3.0);
/// ```
#[derive(Debug)]
pub enum Tensor<T> {
    /// A tensor owning a handle to a contiguous buffer.
    Dense(DenseTensor<T>),
    /// A zero-copy expansion of a dense source.
    Broadcast(BroadcastView<T>),
}

impl<T: TensorElement> Tensor<T> {
    /// Creates a row-major dense tensor from a shape and data.
    pub fn from_shape_vec(shape: &[usize], data: Vec<T>) -> Result<Self, TensorError> {
        Ok(Self::Dense(DenseTensor::from_shape_vec(shape, data)?))
    }

    /// Creates a dense tensor whose data is laid out under `order`.
    pub fn from_shape_vec_with_order(
        shape: &[usize],
        data: Vec<T>,
        order: StrideOrder,
    ) -> Result<Self, TensorError> {
        Ok(Self::Dense(DenseTensor::from_shape_vec_with_order(
            shape, data, order,
        )?))
    }

    /// Creates a dense tensor filled with `value`.
    pub fn from_shape_val(shape: &[usize], value: T) -> Self {
        Self::Dense(DenseTensor::from_shape_val(shape, value))
    }

    /// Creates a dense tensor by evaluating `f` at every multi-index.
    pub fn from_shape_fn<F>(shape: &[usize], f: F) -> Self
    where
        F: Fn(&[usize]) -> T,
    {
        Self::Dense(DenseTensor::from_shape_fn(shape, f))
    }

    /// Creates a dense tensor of zeros.
    pub fn zeros(shape: &[usize]) -> Self {
        Self::Dense(DenseTensor::zeros(shape))
    }

    /// Creates a rank-0 tensor.
    pub fn scalar(value: T) -> Self {
        Self::Dense(DenseTensor::scalar(value))
    }

    /// Allocates a default-filled dense tensor of another element type.
    pub fn clone_empty<R: TensorElement>(&self, shape: &[usize]) -> Tensor<R> {
        Tensor::Dense(DenseTensor::from_shape_val(shape, R::default()))
    }

    /// Returns true for the dense variant.
    pub fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }

    /// The dense variant, if this is one.
    pub fn as_dense(&self) -> Option<&DenseTensor<T>> {
        match self {
            Self::Dense(t) => Some(t),
            Self::Broadcast(_) => None,
        }
    }

    /// Broadcast axes; empty for a dense tensor.
    pub fn broadcast_dims(&self) -> &[usize] {
        match self {
            Self::Dense(_) => &[],
            Self::Broadcast(v) => v.broadcast_dims(),
        }
    }

    /// The stride convention of the underlying buffer.
    pub fn stride_order(&self) -> StrideOrder {
        match self {
            Self::Dense(t) => t.stride_order(),
            Self::Broadcast(v) => v.source().stride_order(),
        }
    }

    /// The storage handle the tensor reads from.
    pub fn storage(&self) -> &TensorStorage<T> {
        match self {
            Self::Dense(t) => t.storage(),
            Self::Broadcast(v) => v.source().storage(),
        }
    }

    /// Returns true if both tensors read from the same buffer.
    pub fn shares_storage(&self, other: &Self) -> bool {
        self.storage().ptr_eq(other.storage())
    }

    /// Returns a new handle to the same data; nothing is copied.
    pub fn share(&self) -> Self {
        match self {
            Self::Dense(t) => Self::Dense(t.share()),
            Self::Broadcast(v) => Self::Broadcast(v.clone()),
        }
    }

    /// Reinterprets the tensor with a new shape of the same element count.
    ///
    /// # Errors
    ///
    /// Broadcast views cannot be reshaped without materializing them first and fail
    /// with [`TensorError::UnsupportedOperation`].
    pub fn reshape(&self, dims: &[usize]) -> Result<Self, TensorError> {
        match self {
            Self::Dense(t) => Ok(Self::Dense(t.reshape(dims)?)),
            Self::Broadcast(_) => Err(TensorError::unsupported_operation(
                "reshape",
                "a broadcast view has no contiguous layout; materialize it with to_dense first",
            )),
        }
    }

    /// Inserts a size-1 axis at `dim`.
    pub fn insert_dim(&self, dim: usize) -> Result<Self, TensorError> {
        match self {
            Self::Dense(t) => Ok(Self::Dense(t.insert_dim(dim)?)),
            Self::Broadcast(v) => Ok(Self::Broadcast(v.insert_dim(dim)?)),
        }
    }

    /// Removes the size-1 axis at `dim`.
    pub fn remove_dim(&self, dim: usize) -> Result<Self, TensorError> {
        match self {
            Self::Dense(t) => Ok(Self::Dense(t.remove_dim(dim)?)),
            Self::Broadcast(v) => v.remove_dim(dim),
        }
    }

    /// Expands the size-1 axis `dim` to `size` without copying.
    pub fn broadcast_dim(&self, dim: usize, size: usize) -> Result<Self, TensorError> {
        match self {
            Self::Dense(t) => Ok(Self::Broadcast(t.broadcast_dim(dim, size)?)),
            Self::Broadcast(v) => Ok(Self::Broadcast(v.broadcast_dim(dim, size)?)),
        }
    }

    /// Materializes an independent row-major dense copy.
    pub fn to_dense(&self) -> DenseTensor<T> {
        match self {
            Self::Dense(t) => t.to_row_major(),
            Self::Broadcast(v) => v.to_dense(),
        }
    }

    /// A row-major dense tensor with the same values, sharing storage when possible.
    pub fn contiguous(&self) -> DenseTensor<T> {
        match self {
            Self::Dense(t) if t.is_row_major() => t.share(),
            _ => self.to_dense(),
        }
    }

    /// Copies the elements out in linear-index order.
    pub fn to_vec(&self) -> Vec<T> {
        match self {
            Self::Dense(t) => t.to_vec(),
            Self::Broadcast(v) => v.to_dense().to_vec(),
        }
    }

    /// Buffer offset of a multi-index, for addressing a pinned buffer.
    pub fn storage_offset(&self, index: &[usize]) -> Result<usize, TensorError> {
        match self {
            Self::Dense(t) => t.offset_of(index),
            Self::Broadcast(v) => {
                check_index(index, v.shape())?;
                Ok(v.storage_offset_unchecked(index))
            }
        }
    }

    /// Buffer strides per axis, 0 on broadcast axes.
    pub fn storage_strides(&self) -> Vec<usize> {
        match self {
            Self::Dense(t) => t.strides().to_vec(),
            Self::Broadcast(v) => v.storage_strides().to_vec(),
        }
    }

    /// Pins the buffer for reading until the returned guard drops.
    pub fn pin(&self) -> TensorPin<'_, T> {
        TensorPin {
            guard: self.storage().read(),
            tensor: self,
        }
    }

    /// Pins the buffer for writing until the returned guard drops.
    pub fn pin_mut(&mut self) -> TensorPinMut<'_, T> {
        let tensor: &Self = self;
        TensorPinMut {
            guard: tensor.storage().write(),
            tensor,
        }
    }

    fn source_index(&self, index: usize) -> usize {
        match self {
            Self::Dense(_) => index,
            Self::Broadcast(v) => v.source_index(index),
        }
    }
}

impl<T: TensorElement> Clone for Tensor<T> {
    /// Dense tensors are deep-copied; views get a new view over the same source.
    fn clone(&self) -> Self {
        match self {
            Self::Dense(t) => Self::Dense(t.clone()),
            Self::Broadcast(v) => Self::Broadcast(v.clone()),
        }
    }
}

impl<T: TensorElement> From<DenseTensor<T>> for Tensor<T> {
    fn from(t: DenseTensor<T>) -> Self {
        Self::Dense(t)
    }
}

impl<T: TensorElement> From<BroadcastView<T>> for Tensor<T> {
    fn from(v: BroadcastView<T>) -> Self {
        Self::Broadcast(v)
    }
}

impl<T: TensorElement> TensorAccess<T> for Tensor<T> {
    fn shape(&self) -> &[usize] {
        match self {
            Self::Dense(t) => t.shape(),
            Self::Broadcast(v) => v.shape(),
        }
    }

    fn strides(&self) -> &[usize] {
        match self {
            Self::Dense(t) => t.strides(),
            Self::Broadcast(v) => v.strides(),
        }
    }

    fn get_value(&self, index: usize) -> Result<T, TensorError> {
        match self {
            Self::Dense(t) => t.get_value(index),
            Self::Broadcast(v) => v.get_value(index),
        }
    }

    fn set_value(&mut self, index: usize, value: T) -> Result<(), TensorError> {
        match self {
            Self::Dense(t) => t.set_value(index, value),
            Self::Broadcast(v) => v.set_value(index, value),
        }
    }

    fn get(&self, index: &[usize]) -> Result<T, TensorError> {
        match self {
            Self::Dense(t) => t.get(index),
            Self::Broadcast(v) => v.get(index),
        }
    }

    fn set(&mut self, index: &[usize], value: T) -> Result<(), TensorError> {
        match self {
            Self::Dense(t) => t.set(index, value),
            Self::Broadcast(v) => v.set(index, value),
        }
    }
}

/// A read pin: holds the storage lock and resolves linear indices without relocking.
pub struct TensorPin<'a, T> {
    guard: StorageReadGuard<'a, T>,
    tensor: &'a Tensor<T>,
}

impl<T: TensorElement> TensorPin<'_, T> {
    /// The whole pinned buffer, addressed with [`Tensor::storage_offset`].
    pub fn buffer(&self) -> &[T] {
        &self.guard
    }

    /// The elements in linear order, available for dense tensors only.
    pub fn as_slice(&self) -> Option<&[T]> {
        self.tensor.is_dense().then_some(&self.guard[..])
    }

    /// The element at linear index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the tensor length.
    #[inline]
    pub fn value(&self, index: usize) -> T {
        self.guard[self.tensor.source_index(index)]
    }
}

/// A write pin over the storage lock.
pub struct TensorPinMut<'a, T> {
    guard: StorageWriteGuard<'a, T>,
    tensor: &'a Tensor<T>,
}

impl<T: TensorElement> TensorPinMut<'_, T> {
    /// The whole pinned buffer.
    pub fn buffer(&self) -> &[T] {
        &self.guard
    }

    /// The elements in linear order, available for dense tensors only.
    pub fn as_mut_slice(&mut self) -> Option<&mut [T]> {
        if self.tensor.is_dense() {
            Some(&mut self.guard[..])
        } else {
            None
        }
    }

    /// The element at linear index `index`.
    #[inline]
    pub fn value(&self, index: usize) -> T {
        self.guard[self.tensor.source_index(index)]
    }

    /// Writes the element at linear index `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the tensor length.
    #[inline]
    pub fn set_value(&mut self, index: usize, value: T) {
        let pos = self.tensor.source_index(index);
        self.guard[pos] = value;
    }
}
