use core::{alloc::Layout, any::Any, fmt, marker::PhantomData, ops::Deref};
use std::sync::Arc;

use crate::{
    allocator::{AllocError, GlobalResource, MemoryResource},
    error::{Error, Result},
    message::Message,
};

/// A typed handle onto a shared [`MemoryResource`].
///
/// An `Allocator<T>` produces [`Shared<T>`] objects. [`rebind`](Self::rebind)
/// derives an allocator for another type that draws from the very same
/// resource, which is how one user-supplied allocator ends up backing the
/// request, response and header objects of a service.
///
/// # Example
///
/// ```
/// use rclcore::{Allocator, RequestId};
///
/// let requests = Allocator::<String>::default();
/// let headers = requests.rebind::<RequestId>();
/// assert!(headers.shares_resource_with(&requests));
/// ```
pub struct Allocator<T> {
    resource: Arc<dyn MemoryResource>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Allocator<T> {
    pub fn new(resource: Arc<dyn MemoryResource>) -> Self {
        Self {
            resource,
            _marker: PhantomData,
        }
    }

    pub fn from_resource<R>(resource: R) -> Self
    where
        R: MemoryResource,
    {
        Self::new(Arc::new(resource))
    }

    /// Returns an allocator for `U` bound to the same memory resource.
    ///
    /// Objects of either type are accounted against that resource and are
    /// credited back to it when released.
    pub fn rebind<U>(&self) -> Allocator<U> {
        Allocator {
            resource: Arc::clone(&self.resource),
            _marker: PhantomData,
        }
    }

    pub fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }

    /// Whether both allocators draw from one memory resource.
    pub fn shares_resource_with<U>(&self, other: &Allocator<U>) -> bool {
        same_resource(&self.resource, &other.resource)
    }

    /// Moves `value` into storage reserved from the resource.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] when the resource refuses the allocation.
    pub fn allocate_shared(&self, value: T) -> Result<Shared<T>, AllocError> {
        self.resource.allocate(Layout::new::<T>())?;
        Ok(Shared {
            inner: Arc::new(Allocation {
                value,
                resource: Arc::clone(&self.resource),
            }),
        })
    }

    /// Allocates a default-constructed `T`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError`] when the resource refuses the allocation.
    pub fn allocate_default(&self) -> Result<Shared<T>, AllocError>
    where
        T: Default,
    {
        self.allocate_shared(T::default())
    }
}

impl<T> Default for Allocator<T> {
    fn default() -> Self {
        Self::from_resource(GlobalResource)
    }
}

impl<T> Clone for Allocator<T> {
    fn clone(&self) -> Self {
        self.rebind()
    }
}

impl<T> fmt::Debug for Allocator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("type", &core::any::type_name::<T>())
            .field("resource", &Arc::as_ptr(&self.resource).cast::<()>())
            .finish()
    }
}

/// Free-function form of [`Allocator::rebind`].
pub fn rebind<U, T>(allocator: &Allocator<T>) -> Allocator<U> {
    allocator.rebind()
}

fn same_resource(a: &Arc<dyn MemoryResource>, b: &Arc<dyn MemoryResource>) -> bool {
    core::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Storage for one allocated object. Credits the resource on drop.
struct Allocation<T> {
    value: T,
    resource: Arc<dyn MemoryResource>,
}

impl<T> Drop for Allocation<T> {
    fn drop(&mut self) {
        self.resource.deallocate(Layout::new::<T>());
    }
}

/// A reference-counted object owned by the resource that allocated it.
///
/// The resource is credited exactly once, when the last clone is dropped,
/// regardless of whether the object travelled through an [`ErasedHandle`] in
/// between.
pub struct Shared<T> {
    inner: Arc<Allocation<T>>,
}

impl<T> Shared<T> {
    /// Mutable access, available only while this is the sole owner.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        Arc::get_mut(&mut this.inner).map(|allocation| &mut allocation.value)
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Whether `allocator` draws from the resource that owns this object.
    pub fn allocated_by(this: &Self, allocator: &Allocator<T>) -> bool {
        same_resource(&this.inner.resource, &allocator.resource)
    }

    /// Forgets the static type, keeping the same storage.
    pub fn into_erased(this: Self) -> ErasedHandle
    where
        T: Message,
    {
        ErasedHandle { inner: this.inner }
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner.value, f)
    }
}

impl<T: Message> From<Shared<T>> for ErasedHandle {
    fn from(shared: Shared<T>) -> Self {
        Shared::into_erased(shared)
    }
}

trait ErasedAllocation: Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn message(&self) -> &dyn Message;
    fn message_mut(&mut self) -> &mut dyn Message;
    fn resource(&self) -> &Arc<dyn MemoryResource>;
}

impl<T: Message> ErasedAllocation for Allocation<T> {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn message(&self) -> &dyn Message {
        &self.value
    }

    fn message_mut(&mut self) -> &mut dyn Message {
        &mut self.value
    }

    fn resource(&self) -> &Arc<dyn MemoryResource> {
        &self.resource
    }
}

/// An allocated object whose concrete type is known only at runtime.
///
/// This is what the executor passes between `create_request`,
/// `take_request` and `handle_request`. Recover the typed object with
/// [`reinterpret_owned`].
#[derive(Clone)]
pub struct ErasedHandle {
    inner: Arc<dyn ErasedAllocation>,
}

impl ErasedHandle {
    pub fn type_name(&self) -> &'static str {
        self.inner.message().type_name()
    }

    pub fn message(&self) -> &dyn Message {
        self.inner.message()
    }

    /// Mutable access to the object, for filling it from a transport.
    ///
    /// Returns `None` while the handle is cloned.
    pub fn message_mut(&mut self) -> Option<&mut dyn Message> {
        Arc::get_mut(&mut self.inner).map(|allocation| allocation.message_mut())
    }

    pub fn is<T: Message>(&self) -> bool {
        self.inner.message().as_any().is::<T>()
    }

    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.inner.message().as_any().downcast_ref::<T>()
    }

    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl fmt::Debug for ErasedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedHandle")
            .field("type", &self.type_name())
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

/// Recovers the typed object behind `handle` without copying it.
///
/// The result shares storage, and therefore ownership, with the handle.
/// Dropping it is equivalent to dropping the handle.
///
/// # Errors
///
/// - [`Error::HandleTypeMismatch`] if the handle does not hold a `T`.
/// - [`Error::ForeignAllocator`] if the handle was not produced by the memory
///   resource behind `allocator`.
///
/// # Example
///
/// ```
/// use rclcore::{reinterpret_owned, Allocator, Shared};
///
/// let alloc = Allocator::<u32>::default();
/// let original = alloc.allocate_shared(42).unwrap();
/// let erased = Shared::into_erased(original.clone());
///
/// let typed = reinterpret_owned(erased, &alloc).unwrap();
/// assert!(Shared::ptr_eq(&typed, &original));
/// ```
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub fn reinterpret_owned<T: Message>(
    handle: ErasedHandle,
    allocator: &Allocator<T>,
) -> Result<Shared<T>> {
    let expected = core::any::type_name::<T>();
    if !handle.is::<T>() {
        return Err(Error::HandleTypeMismatch {
            expected,
            found: handle.type_name(),
        });
    }
    if !same_resource(handle.inner.resource(), &allocator.resource) {
        return Err(Error::ForeignAllocator {
            type_name: expected,
        });
    }
    let found = handle.type_name();
    handle
        .inner
        .into_any()
        .downcast::<Allocation<T>>()
        .map(|inner| Shared { inner })
        .map_err(|_| Error::HandleTypeMismatch { expected, found })
}
