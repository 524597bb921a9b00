use onyx_tensor::TensorError;
use thiserror::Error;

/// An error type for tensor operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorOpsError {
    /// Tensor error
    #[error("Error with the tensor: {0}")]
    TensorError(#[from] TensorError),

    /// An operand does not have the rank the kernel requires.
    #[error("Rank mismatch: {op} expects rank {expected}, got {actual}")]
    RankMismatch {
        /// The kernel that rejected the operand.
        op: &'static str,
        /// Required rank, or a description of the accepted ranks.
        expected: String,
        /// Rank of the operand.
        actual: usize,
    },

    /// Shape mismatch
    #[error("Shape mismatch: {0:?} != {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// The axis to perform the operation over is not an axis of the tensor.
    #[error("Axis out of range. The axis {0} is out of range for rank {1}.")]
    AxisOutOfRange(i64, usize),

    /// The same axis was named twice.
    #[error("Axis {0} is repeated")]
    RepeatedAxis(usize),

    /// The destination cannot hold every result element.
    #[error("Destination too small: {required} elements required, {actual} available")]
    DestinationTooSmall {
        /// Number of elements the kernel writes.
        required: usize,
        /// Length of the destination.
        actual: usize,
    },

    /// The operand shapes cannot be broadcast together.
    #[error("Shapes {0:?} and {1:?} cannot be broadcast together")]
    BroadcastIncompatible(Vec<usize>, Vec<usize>),

    /// A scalar or array parameter is outside its valid domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TensorOpsError {
    pub(crate) fn rank_mismatch(op: &'static str, expected: impl ToString, actual: usize) -> Self {
        Self::RankMismatch {
            op,
            expected: expected.to_string(),
            actual,
        }
    }
}
