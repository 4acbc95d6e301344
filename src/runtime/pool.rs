//! Bounded free lists for runtimes and call frames.

use tracing::warn;

use super::vm::{ScriptFrame, ScriptRuntime};

/// State that can be wiped for reuse without giving up its allocations.
pub trait Recycle: Default {
    fn recycle(&mut self);
}

impl<T: Recycle> Recycle for Box<T> {
    fn recycle(&mut self) {
        (**self).recycle();
    }
}

/// A free list holding at most `capacity` recycled entries. Acquiring from
/// an empty pool allocates; releasing into a full pool drops the entry.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    capacity: usize,
}

pub type ScriptFramePool = Pool<ScriptFrame>;
pub type ScriptRuntimePool = Pool<Box<ScriptRuntime>>;

impl<T: Recycle> Pool<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    pub fn acquire(&mut self) -> T {
        self.free.pop().unwrap_or_default()
    }

    pub fn release(&mut self, mut entry: T) {
        if self.free.len() >= self.capacity {
            warn!(
                pool = std::any::type_name::<T>(),
                capacity = self.capacity,
                "pool is full, dropping entry"
            );
            return;
        }
        entry.recycle();
        self.free.push(entry);
    }

    pub fn release_all(&mut self, entries: impl IntoIterator<Item = T>) {
        for entry in entries {
            self.release(entry);
        }
    }

    /// Entries waiting for reuse.
    pub fn len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Counter(u32);

    impl Recycle for Counter {
        fn recycle(&mut self) {
            self.0 = 0;
        }
    }

    #[test]
    fn released_entries_are_recycled() {
        let mut pool = Pool::with_capacity(2);
        let mut entry: Counter = pool.acquire();
        entry.0 = 5;
        pool.release(entry);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.acquire(), Counter(0));
        assert!(pool.is_empty());
    }

    #[test]
    fn full_pool_drops_entries() {
        let mut pool = Pool::with_capacity(1);
        pool.release_all([Counter(1), Counter(2), Counter(3)]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn runtime_pool_reuses_boxes() {
        let mut pool = ScriptRuntimePool::with_capacity(1);
        let mut runtime = pool.acquire();
        runtime.push_int(3);
        pool.release(runtime);
        assert!(pool.acquire().int_stack().is_empty());
    }
}
