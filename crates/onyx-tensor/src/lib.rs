#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! `onyx-tensor` provides the N-dimensional tensor abstraction the operator kernels of
//! `onyx-tensor-ops` run on. A [`Tensor`] is either a [`DenseTensor`] that holds a handle
//! to one contiguous buffer, or a [`BroadcastView`] that virtually expands a dense source
//! along size-1 axes without copying.
//!
//! # Memory model
//!
//! - Buffers live in a [`TensorStorage`]: an `Arc<RwLock<Vec<T>>>`. Handles are cheap to
//!   share and the buffer is released with the last one.
//! - Dense views (`reshape`, `insert_dim`, `remove_dim`) share the buffer; `clone` on a
//!   dense tensor copies it.
//! - Broadcast views hold a handle to their source, so they can never outlive the data
//!   they read. Writes through a view land in the source buffer.
//! - Kernels pin a buffer with [`Tensor::pin`] / [`Tensor::pin_mut`] and address it with
//!   [`Tensor::storage_offset`] and [`Tensor::storage_strides`].
//!
//! # Quick Start
//!
//! ```rust
//! use onyx_tensor::{Tensor, TensorAccess};
//!
//! let column = Tensor::<f32>::from_shape_vec(&[3, 1], vec![1.0, 2.0, 3.0]).unwrap();
//! let mut wide = column.broadcast_dim(1, 4).unwrap();
//! assert_eq!(wide.shape(), &[3, 4]);
//! assert_eq!(wide.get(&[2, 3]).unwrap(), 3.0);
//!
//! // every position of a broadcast axis aliases the same source element
//! wide.set(&[0, 2], 10.0).unwrap();
//! assert_eq!(column.get(&[0, 0]).unwrap(), 10.0);
//! ```

/// Dense tensor backed by a contiguous buffer.
pub mod dense;

/// Element type trait implemented by every supported numeric type.
pub mod element;

/// Error type shared by tensor construction and view operations.
pub mod error;

/// Serde support for dense tensors.
///
/// Enabled with the `serde` feature; serializes `data`, `shape`, `strides` and the
/// stride order.
#[cfg(feature = "serde")]
pub mod serde;

/// Shape, stride and index helpers.
pub mod shape;

/// Reference-counted, lock-guarded element storage.
pub mod storage;

/// The tagged tensor type, the access trait and buffer pins.
pub mod tensor;

/// Zero-copy broadcast views.
pub mod view;

pub use crate::dense::DenseTensor;
pub use crate::element::TensorElement;
pub use crate::error::TensorError;
pub use crate::shape::{get_strides_from_shape, StrideOrder};
pub use crate::storage::TensorStorage;
pub use crate::tensor::{Tensor, TensorAccess, TensorPin, TensorPinMut};
pub use crate::view::BroadcastView;
