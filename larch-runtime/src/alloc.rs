//! Raw block allocation.
//!
//! The underlying bulk allocator is an external collaborator; this shim
//! only maps its failure mode onto the status channel. Every family
//! allocates its header-plus-payload block here and frees it here.

use {
    crate::status::{Error, Result},
    std::ptr::NonNull,
};

/// Alignment every block is guaranteed to have.
///
/// `malloc` aligns for the largest fundamental type; payload areas are
/// placed at multiples of this offset so any element the allocator can
/// align lands correctly.
pub const BLOCK_ALIGN: usize = 16;

/// Allocate a block of at least `size` bytes.
///
/// A zero-sized request still yields a valid, unique block.
pub fn alloc_block(size: usize) -> Result<NonNull<u8>>
{
    // SAFETY: malloc with a non-zero size.
    let ptr = unsafe { libc::malloc(size.max(1)) };
    NonNull::new(ptr.cast::<u8>()).ok_or(Error::OutOfMem)
}

/// Allocate a zero-filled block of at least `size` bytes.
///
/// All-zero payload bytes are the valid empty state of every family's
/// descriptor, so a block from here is always safe to release.
pub fn alloc_block_zeroed(size: usize) -> Result<NonNull<u8>>
{
    // SAFETY: calloc with a non-zero size.
    let ptr = unsafe { libc::calloc(1, size.max(1)) };
    NonNull::new(ptr.cast::<u8>()).ok_or(Error::OutOfMem)
}

/// Free a block.
///
/// # Safety
///
/// `ptr` must come from [`alloc_block`] or [`alloc_block_zeroed`] and
/// must not be freed twice.
pub unsafe fn free_block(ptr: NonNull<u8>)
{
    libc::free(ptr.as_ptr().cast());
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn zero_sized_blocks_are_valid()
    {
        let a = alloc_block(0).unwrap();
        let b = alloc_block_zeroed(0).unwrap();
        assert_ne!(a, b);
        // SAFETY: Both blocks were just allocated.
        unsafe {
            free_block(a);
            free_block(b);
        }
    }

    #[test]
    fn zeroed_blocks_are_zeroed()
    {
        let block = alloc_block_zeroed(64).unwrap();
        // SAFETY: The block spans 64 bytes.
        let bytes = unsafe {
            std::slice::from_raw_parts(block.as_ptr(), 64)
        };
        assert!(bytes.iter().all(|&b| b == 0));
        // SAFETY: The block was just allocated.
        unsafe { free_block(block); }
    }
}
