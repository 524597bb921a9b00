//! Reference-counted, lock-guarded storage shared by dense tensors and their views.
//!
//! A [`TensorStorage`] is a cheap handle: cloning it shares the buffer. Zero-copy views
//! (`reshape`, `insert_dim`, broadcast views) hold such handles, so the buffer stays alive
//! for as long as any tensor reads from it and is released when the last handle drops.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Read guard over a storage buffer.
pub type StorageReadGuard<'a, T> = RwLockReadGuard<'a, Vec<T>>;

/// Write guard over a storage buffer.
pub type StorageWriteGuard<'a, T> = RwLockWriteGuard<'a, Vec<T>>;

/// A contiguous element buffer behind an `Arc<RwLock<_>>`.
///
/// # Thread Safety
///
/// Readers take recursive read locks so one thread may pin the same buffer twice
/// (e.g. `matmul(x, x)`). Writers are serialized by the lock; ordering between
/// concurrent writers is the caller's responsibility.
pub struct TensorStorage<T> {
    buffer: Arc<RwLock<Vec<T>>>,
}

impl<T> TensorStorage<T> {
    /// Creates a new storage from a vector, taking ownership of it.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            buffer: Arc::new(RwLock::new(data)),
        }
    }

    /// Returns the number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.buffer.read_recursive().len()
    }

    /// Returns true if the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if both handles point at the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }

    /// Number of live handles to this buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.buffer)
    }

    /// Acquire a read guard; released when the guard drops.
    pub fn read(&self) -> StorageReadGuard<'_, T> {
        self.buffer.read_recursive()
    }

    /// Acquire a write guard; released when the guard drops.
    pub fn write(&self) -> StorageWriteGuard<'_, T> {
        self.buffer.write()
    }
}

impl<T: Clone> TensorStorage<T> {
    /// Copies the buffer into a fresh, unshared storage.
    pub fn deep_clone(&self) -> Self {
        Self::from_vec(self.read().clone())
    }
}

impl<T> Clone for TensorStorage<T> {
    /// Shares the buffer; use [`TensorStorage::deep_clone`] for an independent copy.
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

impl<T> std::fmt::Debug for TensorStorage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorStorage")
            .field("len", &self.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::TensorStorage;

    #[test]
    fn test_shared_handles() {
        let storage = TensorStorage::from_vec(vec![1u8, 2, 3]);
        let other = storage.clone();
        assert!(storage.ptr_eq(&other));
        assert_eq!(storage.handle_count(), 2);

        other.write()[0] = 7;
        assert_eq!(storage.read()[0], 7);

        drop(other);
        assert_eq!(storage.handle_count(), 1);
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let storage = TensorStorage::from_vec(vec![1.0f32, 2.0]);
        let copy = storage.deep_clone();
        assert!(!storage.ptr_eq(&copy));
        copy.write()[1] = 5.0;
        assert_eq!(storage.read()[1], 2.0);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_recursive_reads() {
        let storage = TensorStorage::from_vec(vec![3i32; 4]);
        let a = storage.read();
        let b = storage.read();
        assert_eq!(a[0] + b[3], 6);
    }
}
