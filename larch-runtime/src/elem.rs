//! The injected destructor/copy vocabulary.
//!
//! Payload shape is a runtime decision at each construction site, not a
//! compile-time property of a container's declared type. A container
//! therefore hosts its elements through an [`ElemOps`] value supplied by
//! the caller: one destructor, one copy constructor, one size. Every
//! type-erased family (arrays, lists, boxed cells, closures, exception
//! payloads) shares this vocabulary, which is what lets each of them own
//! exactly one free/copy implementation regardless of what is stored.

use {
    crate::{alloc::BLOCK_ALIGN, status::Result},
    std::{mem::{align_of, needs_drop, size_of}, ptr::NonNull},
};

/// Destructor for one element, injected at construction time.
///
/// Receives the element in place; must leave the bytes dead but sound to
/// overwrite or free.
pub type DropFn = unsafe fn(NonNull<u8>);

/// Copy constructor for one element, injected at construction time.
///
/// Builds a new element at `dst` from the one at `src`. Fallible so a
/// bulk construction can stop mid-way and release only what it built.
pub type CloneFn = unsafe fn(src: NonNull<u8>, dst: NonNull<u8>) -> Result<()>;

/// How a container hosts one payload shape.
///
/// `None` in either slot means the trivial behavior: nothing to destroy,
/// bitwise copy. Element alignment must not exceed
/// [`BLOCK_ALIGN`]; payload areas begin at multiples of it.
#[derive(Clone, Copy, Debug)]
pub struct ElemOps
{
    /// Size of one element in bytes.
    pub size: usize,

    /// Destructor, or `None` for trivially destroyed elements.
    pub drop: Option<DropFn>,

    /// Copy constructor, or `None` for bitwise-copied elements.
    pub clone: Option<CloneFn>,
}

impl ElemOps
{
    /// Ops for a trivial (plain-bytes) element of the given size.
    pub const fn trivial(size: usize) -> Self
    {
        Self{size, drop: None, clone: None}
    }

    /// Ops for a Rust element type.
    ///
    /// Used by embedders and tests; generated code supplies its own
    /// function pointers instead.
    ///
    /// # Panics
    ///
    /// Panics if `T` needs more alignment than payload areas guarantee.
    pub fn of<T: Clone>() -> Self
    {
        assert!(align_of::<T>() <= BLOCK_ALIGN);
        Self{
            size: size_of::<T>(),
            drop: needs_drop::<T>().then_some(drop_typed::<T> as DropFn),
            clone: Some(clone_typed::<T> as CloneFn),
        }
    }

    /// Whether both roles are trivial.
    pub fn is_trivial(&self) -> bool
    {
        self.drop.is_none() && self.clone.is_none()
    }

    /// Destroy the element at `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must hold a live element of this shape.
    pub unsafe fn drop_one(&self, ptr: NonNull<u8>)
    {
        if let Some(drop) = self.drop {
            drop(ptr);
        }
    }

    /// Copy-construct the element at `dst` from the one at `src`.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of this shape; `dst` must point to
    /// `size` writable bytes that do not overlap `src`.
    pub unsafe fn clone_one(&self, src: NonNull<u8>, dst: NonNull<u8>)
        -> Result<()>
    {
        match self.clone {
            Some(clone) => clone(src, dst),
            None => {
                src.as_ptr().copy_to_nonoverlapping(dst.as_ptr(), self.size);
                Ok(())
            },
        }
    }
}

unsafe fn drop_typed<T>(ptr: NonNull<u8>)
{
    std::ptr::drop_in_place(ptr.cast::<T>().as_ptr());
}

unsafe fn clone_typed<T: Clone>(src: NonNull<u8>, dst: NonNull<u8>)
    -> Result<()>
{
    let value = src.cast::<T>().as_ref().clone();
    dst.cast::<T>().as_ptr().write(value);
    Ok(())
}

#[cfg(test)]
mod tests
{
    use {super::*, std::sync::atomic::{AtomicUsize, Ordering}};

    #[test]
    fn trivial_ops_copy_bitwise()
    {
        let ops = ElemOps::trivial(size_of::<u64>());
        assert!(ops.is_trivial());

        let src = 0x1234_5678_9abc_def0u64;
        let mut dst = 0u64;
        // SAFETY: Both point to live u64s.
        unsafe {
            ops.clone_one(
                NonNull::from(&src).cast(),
                NonNull::from(&mut dst).cast(),
            ).unwrap();
        }
        assert_eq!(dst, src);
    }

    #[test]
    fn typed_ops_run_destructors()
    {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        #[derive(Clone)]
        struct Tracked;

        impl Drop for Tracked
        {
            fn drop(&mut self)
            {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let ops = ElemOps::of::<Tracked>();
        assert!(ops.drop.is_some());

        let value = std::mem::ManuallyDrop::new(Tracked);
        // SAFETY: The element is live and never used again.
        unsafe { ops.drop_one(NonNull::from(&*value).cast()); }
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn plain_copy_types_have_no_destructor()
    {
        let ops = ElemOps::of::<i64>();
        assert!(ops.drop.is_none());
        assert!(ops.clone.is_some());
    }
}
