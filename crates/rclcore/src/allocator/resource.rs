use core::alloc::Layout;

use crossbeam_utils::CachePadded;
use portable_atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::allocator::{AllocError, MemoryResource};

/// The default resource: every allocation is admitted.
///
/// Equivalent to the standard heap allocator; storage comes from whatever
/// `#[global_allocator]` the process installs.
#[derive(Clone, Copy, Debug, Default)]
pub struct GlobalResource;

impl MemoryResource for GlobalResource {
    fn allocate(&self, _layout: Layout) -> Result<(), AllocError> {
        Ok(())
    }

    fn deallocate(&self, _layout: Layout) {}
}

/// A resource with a fixed byte budget.
///
/// Allocations beyond the budget fail with [`AllocError`] instead of growing
/// the heap, which makes it suitable for bounded pools and for observing how
/// many objects a given role keeps alive.
///
/// ## Features
/// - ✅ Thread-safe, lock-free accounting
/// - ✅ Tracks live objects and total allocations
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use rclcore::{Allocator, BoundedResource};
///
/// let pool = Arc::new(BoundedResource::new(64));
/// let alloc = Allocator::<u64>::new(pool.clone());
///
/// let value = alloc.allocate_shared(7).unwrap();
/// assert_eq!(pool.in_use(), 8);
/// drop(value);
/// assert_eq!(pool.in_use(), 0);
/// ```
#[derive(Debug)]
pub struct BoundedResource {
    capacity: usize,
    in_use: CachePadded<AtomicUsize>,
    live: AtomicUsize,
    total: AtomicU64,
}

impl BoundedResource {
    /// Creates a resource admitting at most `capacity` bytes at once.
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: CachePadded::new(AtomicUsize::new(0)),
            live: AtomicUsize::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently reserved.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Bytes that can still be reserved.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.in_use())
    }

    /// Objects currently alive.
    pub fn live_allocations(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Objects ever admitted.
    pub fn total_allocations(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl MemoryResource for BoundedResource {
    fn allocate(&self, layout: Layout) -> Result<(), AllocError> {
        let size = layout.size();
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|next| *next <= self.capacity)
            })
            .map_err(|_| AllocError::from(layout))?;
        self.live.fetch_add(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate(&self, layout: Layout) {
        self.in_use.fetch_sub(layout.size(), Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}
