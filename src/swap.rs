//! Whole-value snapshot cell
//!
//! Readers take an `Arc` to the current value and keep using it for the
//! whole operation; writers replace the value in one step. A reader never
//! sees a value assembled from two versions.

use std::sync::Arc;

use parking_lot::RwLock;

pub struct Snapshot<T> {
    current: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
        }
    }

    /// The value as of now
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Replace the value, returning the previous one
    pub fn store(&self, value: T) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), Arc::new(value))
    }
}

impl<T: Default> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loaded_value_survives_store() {
        let cell = Snapshot::new(vec![1, 2, 3]);
        let before = cell.load();
        let previous = cell.store(vec![4]);

        assert_eq!(*before, vec![1, 2, 3]);
        assert_eq!(*previous, vec![1, 2, 3]);
        assert_eq!(*cell.load(), vec![4]);
    }
}
