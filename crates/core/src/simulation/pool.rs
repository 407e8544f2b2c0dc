//! Reusable-object pools for snapshots and scratch fields
//!
//! The step pipeline borrows a fresh [`GridSnapshot`] every step and the
//! Jacobi solver borrows a scratch [`ScalarField`] per solve. Recycling them
//! through a [`Pool`] keeps the hot loop free of large allocations.
//!
//! Every object handed out carries a lease id. The pool remembers which ids
//! are outstanding, so returning the same lease twice (e.g. through a clone)
//! is rejected instead of silently duplicating an entry in the free list.

use crate::error::SimError;
use crate::grid::{GridSnapshot, ScalarField};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Objects a [`Pool`] can manage
pub trait Poolable: Send {
    /// Create a fresh object of the given size
    fn create(width: usize, height: usize) -> Self;

    /// `(width, height)` of this object
    fn dimensions(&self) -> (usize, usize);

    /// Lease id stamped by the pool, if any
    fn lease(&self) -> Option<u64>;

    /// Stamp or clear the lease id
    fn set_lease(&mut self, lease: Option<u64>);

    /// Name used in error messages
    fn kind_name() -> &'static str;
}

impl Poolable for GridSnapshot {
    fn create(width: usize, height: usize) -> Self {
        GridSnapshot::new(width, height)
    }

    fn dimensions(&self) -> (usize, usize) {
        GridSnapshot::dimensions(self)
    }

    fn lease(&self) -> Option<u64> {
        self.lease
    }

    fn set_lease(&mut self, lease: Option<u64>) {
        self.lease = lease;
    }

    fn kind_name() -> &'static str {
        "snapshot"
    }
}

impl Poolable for ScalarField {
    fn create(width: usize, height: usize) -> Self {
        ScalarField::new(width, height)
    }

    fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    fn lease(&self) -> Option<u64> {
        self.lease
    }

    fn set_lease(&mut self, lease: Option<u64>) {
        self.lease = lease;
    }

    fn kind_name() -> &'static str {
        "scalar field"
    }
}

struct PoolInner<T> {
    free: Vec<T>,
    outstanding: FxHashSet<u64>,
    next_lease: u64,
    total_created: usize,
}

/// Thread-safe pool of equally sized objects
///
/// A pool serves exactly one resolution; changing the grid size means
/// building a new pool.
pub struct Pool<T: Poolable> {
    inner: Mutex<PoolInner<T>>,
    width: usize,
    height: usize,
    reserve: usize,
    capacity: usize,
}

/// Pool of full grid snapshots
pub type SnapshotPool = Pool<GridSnapshot>;

/// Pool of scratch scalar fields (Jacobi iterate buffers)
pub type FieldPool = Pool<ScalarField>;

impl<T: Poolable> Pool<T> {
    /// Create a pool and pre-allocate `reserve` objects
    ///
    /// At most `max(reserve, 1) * 2` returned objects are retained; extra
    /// returns are dropped.
    pub fn new(width: usize, height: usize, reserve: usize) -> Self {
        Self::with_capacity(width, height, reserve, reserve.max(1) * 2)
    }

    /// Create a pool with an explicit retention capacity
    pub fn with_capacity(width: usize, height: usize, reserve: usize, capacity: usize) -> Self {
        let pool = Self {
            inner: Mutex::new(PoolInner {
                free: Vec::with_capacity(capacity),
                outstanding: FxHashSet::default(),
                next_lease: 0,
                total_created: 0,
            }),
            width,
            height,
            reserve,
            capacity: capacity.max(reserve),
        };
        pool.warm_up(reserve);
        pool
    }

    /// Pre-allocate objects until `count` are available (bounded by capacity)
    pub fn warm_up(&self, count: usize) {
        let mut inner = self.inner.lock();
        let target = count.min(self.capacity);
        while inner.free.len() < target {
            inner.free.push(T::create(self.width, self.height));
            inner.total_created += 1;
        }
    }

    /// Borrow an object, reusing a returned one when possible
    ///
    /// The contents of a reused object are whatever it held when returned.
    pub fn acquire(&self) -> T {
        let mut inner = self.inner.lock();
        let mut object = match inner.free.pop() {
            Some(object) => object,
            None => {
                inner.total_created += 1;
                T::create(self.width, self.height)
            }
        };
        let lease = inner.next_lease;
        inner.next_lease += 1;
        inner.outstanding.insert(lease);
        object.set_lease(Some(lease));
        object
    }

    /// Return an object for reuse
    ///
    /// Fails without touching the pool if the object has the wrong size or
    /// carries a lease that is not outstanding (already returned). Objects
    /// that were never leased by this pool are adopted.
    pub fn give_back(&self, mut object: T) -> Result<(), SimError> {
        let actual = object.dimensions();
        if actual != (self.width, self.height) {
            return Err(SimError::size_mismatch(
                T::kind_name(),
                (self.width, self.height),
                actual,
            ));
        }

        let mut inner = self.inner.lock();
        if let Some(lease) = object.lease() {
            if !inner.outstanding.remove(&lease) {
                return Err(SimError::PoolMisuse {
                    message: format!(
                        "{} lease {lease} is not outstanding (returned twice?)",
                        T::kind_name()
                    ),
                });
            }
        }
        object.set_lease(None);
        if inner.free.len() < self.capacity {
            inner.free.push(object);
        }
        Ok(())
    }

    /// `(width, height)` of every pooled object
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Number of objects pre-allocated at construction
    pub fn reserve(&self) -> usize {
        self.reserve
    }

    /// Objects ready to be borrowed
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Objects currently lent out
    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    /// Objects ever allocated by this pool
    pub fn total_created(&self) -> usize {
        self.inner.lock().total_created
    }
}
