//! Exception values.
//!
//! An exception pairs a tag from the status-code space with an optional
//! payload block. A null payload means the tag alone is the complete
//! exception, which is true for every built-in kind; only user
//! exceptions carry payloads, shaped per throw site through the
//! injected ops.

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        elem::{DropFn, ElemOps},
        rc::{RefCount, release_raw, retain_raw},
        status::Error,
    },
    std::{fmt, ptr::{self, NonNull}},
};

// Payload starts one aligned unit past the header, as everywhere.
const PAYLOAD_OFFSET: usize = BLOCK_ALIGN;

/// Header of an exception payload block; the payload follows in the
/// same allocation.
#[repr(C)]
pub struct ExnData
{
    rc: RefCount,
    drop_payload: Option<DropFn>,
}

const _: () = assert!(std::mem::size_of::<ExnData>() <= PAYLOAD_OFFSET);

/// A tagged exception value with an optional payload.
///
/// No `Drop` impl; generated code owns every release site through
/// [`free`][`Self::free`].
pub struct Exn
{
    tag: i32,
    data: *mut ExnData,
}

// SAFETY: The payload count is atomic and payloads are not mutated
// through this layer.
unsafe impl Send for Exn { }
unsafe impl Sync for Exn { }

impl Exn
{
    /// A tag-only exception.
    pub const fn new(tag: i32) -> Self
    {
        Self{tag, data: ptr::null_mut()}
    }

    /// An exception carrying a payload copy-constructed through the
    /// injected ops; `ops.drop` becomes the payload's destructor.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of the shape `ops` describes.
    pub unsafe fn with_payload(tag: i32, ops: &ElemOps, src: NonNull<u8>)
        -> crate::status::Result<Self>
    {
        let block = alloc::alloc_block(PAYLOAD_OFFSET + ops.size)?;
        let data = block.cast::<ExnData>().as_ptr();

        if let Err(err) = ops.clone_one(src, payload_of(data)) {
            alloc::free_block(block);
            return Err(err);
        }
        data.write(ExnData{
            rc: RefCount::new(1),
            drop_payload: ops.drop,
        });

        Ok(Self{tag, data})
    }

    /// The tag.
    pub fn tag(&self) -> i32
    {
        self.tag
    }

    /// The payload, or [`None`] for a tag-only exception.
    pub fn payload_ptr(&self) -> Option<NonNull<u8>>
    {
        NonNull::new(self.data).map(|data| payload_of(data.as_ptr()))
    }

    /// Copy the exception: retain the payload (if any) and alias.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op; rc is the first
        // field.
        unsafe { retain_raw(self.data.cast()); }
        Self{tag: self.tag, data: self.data}
    }

    /// Release the payload, leaving a tag-only exception.
    ///
    /// Safe on tag-only exceptions.
    pub fn free(&mut self)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.data.cast()) } == 1 {
            // SAFETY: We were the last owner.
            unsafe {
                if let Some(drop) = (*self.data).drop_payload {
                    drop(payload_of(self.data));
                }
                alloc::free_block(NonNull::new_unchecked(self.data).cast());
            }
        }
        self.data = ptr::null_mut();
    }

    /// The propagatable error for this exception's tag.
    pub fn error(&self) -> Error
    {
        Error::from_code(self.tag).unwrap_or(Error::Failure)
    }
}

impl fmt::Debug for Exn
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("Exn")
            .field("tag", &self.tag)
            .field("payload", &!self.data.is_null())
            .finish()
    }
}

fn payload_of(data: *mut ExnData) -> NonNull<u8>
{
    // SAFETY: Payload blocks are allocated with PAYLOAD_OFFSET + size.
    unsafe { NonNull::new_unchecked(data.cast::<u8>().add(PAYLOAD_OFFSET)) }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        crate::status::code,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[test]
    fn built_in_kinds_are_tag_only()
    {
        let mut exn = Exn::new(code::OUT_OF_RANGE);
        assert_eq!(exn.tag(), code::OUT_OF_RANGE);
        assert!(exn.payload_ptr().is_none());
        assert_eq!(exn.error(), Error::OutOfRange);

        exn.free();
        exn.free();
    }

    #[test]
    fn user_tags_map_to_user_errors()
    {
        let exn = Exn::new(code::USER - 3);
        assert_eq!(exn.error(), Error::User(code::USER - 3));
    }

    #[test]
    fn payloads_follow_the_shared_free_copy_contract()
    {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        unsafe fn drop_counting(_payload: NonNull<u8>)
        {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let ops = ElemOps{
            size: std::mem::size_of::<i64>(),
            drop: Some(drop_counting),
            clone: None,
        };

        let detail = 404i64;
        // SAFETY: The source is a live i64.
        let mut thrown = unsafe {
            Exn::with_payload(code::USER - 1, &ops, NonNull::from(&detail).cast())
                .unwrap()
        };
        let mut caught = thrown.copy();
        assert_eq!(caught.tag(), code::USER - 1);

        let payload = caught.payload_ptr().unwrap();
        // SAFETY: The payload is a live i64.
        assert_eq!(unsafe { payload.cast::<i64>().as_ptr().read() }, 404);

        thrown.free();
        assert_eq!(DROPS.load(Ordering::Relaxed), 0);
        caught.free();
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }
}
