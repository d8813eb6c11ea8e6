use core::alloc::Layout;

/// Returned when a [`MemoryResource`] refuses an allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("memory resource exhausted: cannot allocate {size} bytes (align {align})")]
pub struct AllocError {
    pub size: usize,
    pub align: usize,
}

impl From<Layout> for AllocError {
    fn from(layout: Layout) -> Self {
        Self {
            size: layout.size(),
            align: layout.align(),
        }
    }
}

/// The state behind an [`Allocator`]: an arena, a pool, a budget.
///
/// A resource decides whether an object of a given layout may be created and
/// is credited back exactly once when that object is destroyed. Every
/// [`Allocator`] rebound from the same allocator shares one resource, so a
/// single user-supplied resource can back request, response and header objects
/// alike.
///
/// Implementations must be thread-safe: objects allocated on one worker may be
/// released on another.
///
/// # Example
///
/// ```
/// use core::alloc::Layout;
/// use rclcore::{AllocError, MemoryResource};
///
/// struct Refusing;
///
/// impl MemoryResource for Refusing {
///     fn allocate(&self, layout: Layout) -> Result<(), AllocError> {
///         Err(layout.into())
///     }
///
///     fn deallocate(&self, _layout: Layout) {}
/// }
/// ```
///
/// [`Allocator`]: crate::Allocator
pub trait MemoryResource: Send + Sync + 'static {
    /// Reserves room for one object with the given layout.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] when the resource is exhausted.
    fn allocate(&self, layout: Layout) -> Result<(), AllocError>;

    /// Releases room previously reserved with the same layout.
    fn deallocate(&self, layout: Layout);
}
