#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// NumPy-style broadcasting of two tensors to a common shape.
pub mod broadcast;

/// Hardware capability flags and their process-wide value.
pub mod config;

/// 2D convolution and max pooling.
pub mod conv;

/// Elementwise dispatch and arithmetic.
///
/// Unary and binary kernels over whole tensors. The vectorized entry points process
/// dense buffers in SIMD lanes when the capabilities allow it and fall back to a scalar
/// loop otherwise.
pub mod elementwise;

/// Error types for tensor operations.
///
/// Defines [`TensorOpsError`] for handling failures during tensor computations.
pub mod error;

/// Batched matrix multiplication.
pub mod matmul;

/// Sum, mean, max, min and product reductions over axes.
pub mod reduce;

/// Lane-parallel element traits over the `wide` vector types.
pub mod simd;

/// Shape-transforming operators.
pub mod views;

pub use config::HardwareCapabilities;
pub use error::TensorOpsError;
pub use simd::{SimdElement, SimdFloat};
