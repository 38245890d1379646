//! The foreign-handle family.
//!
//! A foreign handle wraps a raw resource pointer together with the
//! destructor that knows how to release it. Borrowed resources use the
//! provided [`no_free`] destructor and are never released by this
//! layer. Use of the raw pointer itself is not synchronized here.

use {
    crate::{
        alloc,
        rc::{RefCount, release_raw, retain_raw},
        status::{Error, Result},
    },
    std::{ffi::c_void, ptr},
};

/// Destructor for a raw foreign resource.
pub type RawDropFn = unsafe fn(*mut c_void);

/// The no-op destructor for borrowed (non-owned) resources.
///
/// # Safety
///
/// Trivially safe; the signature is unsafe only to match [`RawDropFn`].
pub unsafe fn no_free(_raw: *mut c_void)
{
}

#[repr(C)]
struct CptrData
{
    rc: RefCount,
    drop_raw: RawDropFn,
    raw: *mut c_void,
}

/// A reference-counted foreign-resource handle; null means "no
/// resource".
///
/// No `Drop` impl; generated code owns every release site through
/// [`free`][`Self::free`].
#[repr(transparent)]
pub struct Cptr
{
    inner: *mut CptrData,
}

// SAFETY: The count is atomic. Use of the raw resource from several
// threads is the caller's contract with that resource.
unsafe impl Send for Cptr { }
unsafe impl Sync for Cptr { }

impl Cptr
{
    /// The absent handle; release is a no-op.
    pub const fn null() -> Self
    {
        Self{inner: ptr::null_mut()}
    }

    /// Whether this is the absent handle.
    pub fn is_null(&self) -> bool
    {
        self.inner.is_null()
    }

    /// Wrap a raw resource with its destructor.
    ///
    /// Pass [`no_free`] for resources this runtime must never release.
    pub fn make(raw: *mut c_void, drop_raw: RawDropFn) -> Result<Self>
    {
        let block = alloc::alloc_block(std::mem::size_of::<CptrData>())?;
        let data = block.cast::<CptrData>().as_ptr();
        // SAFETY: The block is fresh and sized for CptrData.
        unsafe {
            data.write(CptrData{rc: RefCount::new(1), drop_raw, raw});
        }
        Ok(Self{inner: data})
    }

    /// Copy the handle: retain and alias.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op; rc is the first
        // field.
        unsafe { retain_raw(self.inner.cast()); }
        Self{inner: self.inner}
    }

    /// Release the handle and null the descriptor.
    ///
    /// On the last reference the stored destructor runs over the raw
    /// pointer (skipped if the resource was already taken), then the
    /// wrapper is released. Safe on the null descriptor.
    pub fn free(&mut self)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.inner.cast()) } == 1 {
            // SAFETY: We were the last owner.
            unsafe {
                let data = &*self.inner;
                if !data.raw.is_null() {
                    (data.drop_raw)(data.raw);
                }
                alloc::free_block(
                    ptr::NonNull::new_unchecked(self.inner).cast());
            }
        }
        self.inner = ptr::null_mut();
    }

    /// The raw resource, or [`NullPtr`][`Error::NullPtr`] for the
    /// absent handle.
    pub fn raw(&self) -> Result<*mut c_void>
    {
        // SAFETY: A non-null descriptor heads a live allocation.
        match unsafe { self.inner.as_ref() } {
            Some(data) => Ok(data.raw),
            None       => Err(Error::NullPtr),
        }
    }

    #[cfg(test)]
    fn count(&self) -> Option<isize>
    {
        // SAFETY: A non-null descriptor heads a live allocation.
        unsafe { self.inner.as_ref().map(|data| data.rc.load()) }
    }
}
