//! The boxed-cell family.
//!
//! A boxed cell is a single-slot owned box whose payload may be
//! replaced. Absence of a value is the null descriptor, never an
//! internal flag. Element ops are supplied at each call site, like the
//! list family; the cell stores only its count and the payload.

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        elem::ElemOps,
        rc::{RefCount, release_raw, retain_raw},
        status::{Error, Result},
    },
    std::ptr::{self, NonNull},
};

// Payload starts one aligned unit past the count, as everywhere.
const PAYLOAD_OFFSET: usize = BLOCK_ALIGN;

/// A reference-counted single-slot box; null means "no value".
///
/// No `Drop` impl: generated code owns every release site explicitly
/// through [`free`][`Self::free`].
#[repr(transparent)]
pub struct RefBox
{
    inner: *mut RefCount,
}

// SAFETY: The count is atomic. Payload replacement through shared
// descriptors is a caller-level data race this layer does not prevent.
unsafe impl Send for RefBox { }
unsafe impl Sync for RefBox { }

impl RefBox
{
    /// The absent box; release is a no-op.
    pub const fn null() -> Self
    {
        Self{inner: ptr::null_mut()}
    }

    /// Whether this is the absent box.
    pub fn is_null(&self) -> bool
    {
        self.inner.is_null()
    }

    /// Box one value, copy-constructed through the injected ops.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of the shape `ops` describes.
    pub unsafe fn make(src: NonNull<u8>, ops: &ElemOps) -> Result<Self>
    {
        let block = alloc::alloc_block(PAYLOAD_OFFSET + ops.size)?;

        if let Err(err) = ops.clone_one(src, payload_of(block)) {
            alloc::free_block(block);
            return Err(err);
        }
        block.cast::<RefCount>().as_ptr().write(RefCount::new(1));

        Ok(Self{inner: block.cast().as_ptr()})
    }

    /// Copy the box: retain and alias.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op.
        unsafe { retain_raw(self.inner); }
        Self{inner: self.inner}
    }

    /// Release the box and null the descriptor.
    ///
    /// On the last reference the payload is destroyed through the
    /// injected ops, then the allocation is released. Safe on the null
    /// descriptor.
    pub fn free(&mut self, ops: &ElemOps)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.inner) } == 1 {
            // SAFETY: We were the last owner.
            unsafe {
                let block = NonNull::new_unchecked(self.inner).cast::<u8>();
                ops.drop_one(payload_of(block));
                alloc::free_block(block);
            }
        }
        self.inner = ptr::null_mut();
    }

    /// The payload slot, or [`NullPtr`][`Error::NullPtr`] for the
    /// absent box.
    pub fn payload_ptr(&self) -> Result<NonNull<u8>>
    {
        match NonNull::new(self.inner) {
            Some(block) => Ok(payload_of(block.cast())),
            None        => Err(Error::NullPtr),
        }
    }

    /// Replace the payload: destroy the old value, copy the new one in.
    ///
    /// The replacement is visible through every alias of the box. If
    /// the copy fails, the slot is left all-zero, the valid empty
    /// payload state, so the box remains releasable.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of the shape `ops` describes, and
    /// no other thread may touch the payload during the replacement.
    pub unsafe fn set(&self, src: NonNull<u8>, ops: &ElemOps) -> Result<()>
    {
        let slot = self.payload_ptr()?;
        ops.drop_one(slot);
        if let Err(err) = ops.clone_one(src, slot) {
            slot.as_ptr().write_bytes(0, ops.size);
            return Err(err);
        }
        Ok(())
    }

    #[cfg(test)]
    fn count(&self) -> Option<isize>
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        unsafe { self.inner.as_ref().map(RefCount::load) }
    }
}

fn payload_of(block: NonNull<u8>) -> NonNull<u8>
{
    // SAFETY: Boxes are allocated with PAYLOAD_OFFSET + size bytes.
    unsafe { NonNull::new_unchecked(block.as_ptr().add(PAYLOAD_OFFSET)) }
}
