//! The reference-count primitive shared by every family.
//!
//! Each family's allocation begins with a [`RefCount`]; there is no
//! universal base type beyond that. Copying a handle is always
//! "increment and duplicate the descriptor", never a deep copy, and the
//! *pre-decrement* value returned by [`release`][`RefCount::release`]
//! tells the caller whether it just dropped the last reference.

use std::sync::atomic::{AtomicIsize, Ordering, fence};

/// Atomic reference count at the head of a family allocation.
#[repr(transparent)]
pub struct RefCount(AtomicIsize);

impl RefCount
{
    /// A count owned by `n` handles.
    pub const fn new(n: isize) -> Self
    {
        Self(AtomicIsize::new(n))
    }

    /// Add one owner.
    pub fn retain(&self)
    {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one owner, returning the count *before* the decrement.
    ///
    /// A return value of 1 means the caller was the last owner and must
    /// now release the payload and the allocation. The acquire fence
    /// orders that release after every other thread's final use.
    pub fn release(&self) -> isize
    {
        let prev = self.0.fetch_sub(1, Ordering::Release);
        if prev == 1 {
            fence(Ordering::Acquire);
        }
        prev
    }

    /// The current count. Meaningful only when the caller holds a
    /// reference; used by assertions and tests.
    pub fn load(&self) -> isize
    {
        self.0.load(Ordering::Relaxed)
    }
}

/// Retain through a possibly-null pointer; null is a defined no-op.
///
/// # Safety
///
/// A non-null `rc` must point to a live count.
pub unsafe fn retain_raw(rc: *mut RefCount)
{
    if let Some(rc) = rc.as_ref() {
        rc.retain();
    }
}

/// Release through a possibly-null pointer; null is a defined no-op.
///
/// Returns the pre-decrement count, or 0 for null (never 1, so a null
/// handle is never mistaken for the last owner).
///
/// # Safety
///
/// A non-null `rc` must point to a live count.
pub unsafe fn release_raw(rc: *mut RefCount) -> isize
{
    match rc.as_ref() {
        Some(rc) => rc.release(),
        None     => 0,
    }
}

#[cfg(test)]
mod tests
{
    use {super::*, std::ptr, std::thread};

    #[test]
    fn release_reports_the_pre_decrement_value()
    {
        let rc = RefCount::new(1);
        rc.retain();
        rc.retain();
        assert_eq!(rc.release(), 3);
        assert_eq!(rc.release(), 2);
        assert_eq!(rc.release(), 1);
    }

    #[test]
    fn null_is_a_no_op()
    {
        // SAFETY: Null is explicitly permitted.
        unsafe {
            retain_raw(ptr::null_mut());
            assert_eq!(release_raw(ptr::null_mut()), 0);
        }
    }

    #[test]
    fn exactly_one_thread_observes_the_last_release()
    {
        const THREADS: isize = 8;
        const PER_THREAD: isize = 1000;

        let rc = RefCount::new(THREADS * PER_THREAD);
        let last_owners = thread::scope(|scope| {
            let handles: Vec<_> = (0 .. THREADS)
                .map(|_| scope.spawn(|| {
                    let mut last = 0;
                    for _ in 0 .. PER_THREAD {
                        if rc.release() == 1 {
                            last += 1;
                        }
                    }
                    last
                }))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum::<i32>()
        });

        assert_eq!(last_owners, 1);
        assert_eq!(rc.load(), 0);
    }
}
