use thiserror::Error;

/// Error type for tensor construction, element access and view operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    /// Tensor shape does not match the provided data.
    ///
    /// Raised when creating a tensor from data whose length differs from the
    /// product of the shape, or when reshaping to a shape with a different
    /// element count.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements")]
    InvalidShape {
        /// Expected number of elements based on the shape.
        expected: usize,
        /// Actual number of elements.
        actual: usize,
    },

    /// Element or multi-index access beyond the tensor bounds.
    #[error("Index {index} out of bounds for dimension of size {size}")]
    IndexOutOfRange {
        /// The invalid index that was attempted.
        index: usize,
        /// The size of the dimension being indexed.
        size: usize,
    },

    /// A multi-index does not have one component per axis.
    #[error("Rank mismatch: expected an index of rank {expected}, got {actual}")]
    RankMismatch {
        /// Rank of the tensor.
        expected: usize,
        /// Length of the provided index.
        actual: usize,
    },

    /// An axis argument is not a valid axis of the tensor.
    #[error("Axis {axis} out of range for a tensor of rank {rank}")]
    AxisOutOfRange {
        /// The requested axis.
        axis: usize,
        /// The rank the axis was checked against.
        rank: usize,
    },

    /// Dimensions incompatible with the requested view operation.
    #[error("Dimension mismatch: {message}. Expected shape: {expected}, got: {actual}")]
    ShapeMismatch {
        /// Human-readable description of the mismatch.
        message: String,
        /// Expected shape description.
        expected: String,
        /// Actual shape description.
        actual: String,
    },

    /// Operation not supported for this tensor variant.
    #[error("Unsupported operation: {operation} - {reason}")]
    UnsupportedOperation {
        /// Name of the operation that failed.
        operation: String,
        /// Reason why the operation is not supported.
        reason: String,
    },
}

impl TensorError {
    /// Creates an InvalidShape error.
    pub fn invalid_shape(expected: usize, actual: usize) -> Self {
        Self::InvalidShape { expected, actual }
    }

    /// Creates an IndexOutOfRange error.
    pub fn index_out_of_range(index: usize, size: usize) -> Self {
        Self::IndexOutOfRange { index, size }
    }

    /// Creates an AxisOutOfRange error.
    pub fn axis_out_of_range(axis: usize, rank: usize) -> Self {
        Self::AxisOutOfRange { axis, rank }
    }

    /// Creates a ShapeMismatch error with formatted shapes.
    pub fn shape_mismatch(message: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }

    /// Creates an UnsupportedOperation error.
    pub fn unsupported_operation(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}
