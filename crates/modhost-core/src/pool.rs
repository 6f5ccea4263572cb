//! Fixed-capacity object reuse pool.
//!
//! `acquire` hands out a previously released instance when one is idle and
//! builds a fresh one otherwise, so it never waits on an exhausted pool.
//! `release` keeps at most `capacity` idle instances and drops the rest.

use std::fmt;

use parking_lot::Mutex;

/// A pool of reusable values of type `T`.
pub struct ObjectPool<T> {
    /// Idle instances available for reuse.
    idle: Mutex<Vec<T>>,
    /// Maximum idle instances retained.
    capacity: usize,
    /// Constructor for fresh instances.
    factory: Box<dyn Fn() -> T + Send + Sync>,
    /// Hook applied to every released value before it is parked.
    reset: Box<dyn Fn(&mut T) + Send + Sync>,
}

impl<T: Default + 'static> ObjectPool<T> {
    /// Creates a pool building instances with `T::default()`.
    pub fn new(capacity: usize) -> Self {
        Self::with_factory(capacity, T::default)
    }
}

impl<T> ObjectPool<T> {
    /// Creates a pool using `factory` for fresh instances.
    pub fn with_factory(capacity: usize, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            factory: Box::new(factory),
            reset: Box::new(|_| {}),
        }
    }

    /// Sets the hook run on released values (e.g. clearing a buffer).
    pub fn with_reset(mut self, reset: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.reset = Box::new(reset);
        self
    }

    /// Takes an idle instance or constructs a new one.
    pub fn acquire(&self) -> T {
        let reused = self.idle.lock().pop();
        reused.unwrap_or_else(|| (self.factory)())
    }

    /// Returns an instance to the pool.
    pub fn release(&self, mut value: T) {
        (self.reset)(&mut value);
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(value);
        }
    }

    /// Number of idle instances currently parked.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Maximum idle instances retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("capacity", &self.capacity)
            .field("idle", &self.idle_count())
            .finish()
    }
}
