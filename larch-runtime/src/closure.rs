//! The closure family.
//!
//! A closure is a code pointer paired with an optional environment
//! block. The environment carries its own count and its own injected
//! destructor, so closures with call-site-shaped captures still share
//! one free/copy implementation. Two closures may share one
//! environment; they then share its count.

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        elem::{DropFn, ElemOps},
        rc::RefCount,
        status::Result,
    },
    std::ptr::{self, NonNull},
};

// Captures start one aligned unit past the header, as everywhere.
const CAPTURE_OFFSET: usize = BLOCK_ALIGN;

/// Header of an environment block; captures follow in the same
/// allocation.
#[repr(C)]
pub struct FnEnv
{
    rc: RefCount,
    drop_captures: Option<DropFn>,
}

const _: () = assert!(std::mem::size_of::<FnEnv>() <= CAPTURE_OFFSET);

/// A code pointer plus captured environment.
///
/// The code pointer's true signature is the generated caller's
/// business; this layer only manages the environment's lifetime. A null
/// environment is the valid state for capture-free closures, and the
/// all-null descriptor is the valid freed state. No `Drop` impl;
/// generated code owns every release site through
/// [`free`][`Self::free`].
#[repr(C)]
pub struct Closure
{
    code: *const (),
    env: *mut FnEnv,
}

// SAFETY: The environment count is atomic and captures are not mutated
// through this layer.
unsafe impl Send for Closure { }
unsafe impl Sync for Closure { }

impl Closure
{
    /// The absent closure; release is a no-op.
    pub const fn null() -> Self
    {
        Self{code: ptr::null(), env: ptr::null_mut()}
    }

    /// A capture-free closure around a bare code pointer.
    pub const fn from_code(code: *const ()) -> Self
    {
        Self{code, env: ptr::null_mut()}
    }

    /// Build a closure whose captures are copy-constructed through the
    /// injected ops; `ops.drop` becomes the environment's destructor.
    ///
    /// # Safety
    ///
    /// `src` must hold live captures of the shape `ops` describes.
    pub unsafe fn make(code: *const (), ops: &ElemOps, src: NonNull<u8>)
        -> Result<Self>
    {
        let block = alloc::alloc_block(CAPTURE_OFFSET + ops.size)?;
        let env = block.cast::<FnEnv>().as_ptr();

        if let Err(err) = ops.clone_one(src, captures_of(env)) {
            alloc::free_block(block);
            return Err(err);
        }
        env.write(FnEnv{
            rc: RefCount::new(1),
            drop_captures: ops.drop,
        });

        Ok(Self{code, env})
    }

    /// Copy the closure: retain the environment and alias.
    pub fn copy(&self) -> Self
    {
        if let Some(env) = NonNull::new(self.env) {
            // SAFETY: We co-own the environment.
            unsafe { env.as_ref().rc.retain(); }
        }
        Self{code: self.code, env: self.env}
    }

    /// A different code pointer over this closure's environment.
    ///
    /// The two closures share the environment and its count.
    pub fn rebind(&self, code: *const ()) -> Self
    {
        let shared = self.copy();
        Self{code, env: shared.env}
    }

    /// Release the closure and null the descriptor.
    ///
    /// On the environment's last reference its captures are destroyed
    /// through the stored destructor, then the block is released.
    /// Capture-free and already-null closures release trivially.
    pub fn free(&mut self)
    {
        if let Some(env) = NonNull::new(self.env) {
            // SAFETY: We own one reference to the environment.
            if unsafe { env.as_ref().rc.release() } == 1 {
                // SAFETY: We were the last owner.
                unsafe {
                    if let Some(drop) = env.as_ref().drop_captures {
                        drop(captures_of(env.as_ptr()));
                    }
                    alloc::free_block(env.cast());
                }
            }
        }
        *self = Self::null();
    }

    /// The code pointer.
    pub fn code(&self) -> *const ()
    {
        self.code
    }

    /// The captures, or [`None`] for a capture-free closure.
    pub fn captures_ptr(&self) -> Option<NonNull<u8>>
    {
        NonNull::new(self.env).map(|env| captures_of(env.as_ptr()))
    }

    #[cfg(test)]
    fn env_count(&self) -> Option<isize>
    {
        // SAFETY: We co-own the environment.
        unsafe { self.env.as_ref().map(|env| env.rc.load()) }
    }
}

fn captures_of(env: *mut FnEnv) -> NonNull<u8>
{
    // SAFETY: Environments are allocated with CAPTURE_OFFSET + size.
    unsafe { NonNull::new_unchecked(env.cast::<u8>().add(CAPTURE_OFFSET)) }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn add_one(x: i32) -> i32
    {
        x + 1
    }

    fn add_two(x: i32) -> i32
    {
        x + 2
    }

    #[test]
    fn bare_code_closures_carry_no_environment()
    {
        let mut cl = Closure::from_code(add_one as *const ());
        assert!(cl.captures_ptr().is_none());

        // SAFETY: The code pointer was made from this signature.
        let f: fn(i32) -> i32 = unsafe { std::mem::transmute(cl.code()) };
        assert_eq!(f(41), 42);

        cl.free();
        cl.free();
    }

    #[test]
    fn captures_travel_with_the_closure()
    {
        let captured = 100i64;
        // SAFETY: The source is a live i64.
        let mut cl = unsafe {
            Closure::make(
                add_one as *const (),
                &ElemOps::trivial(std::mem::size_of::<i64>()),
                NonNull::from(&captured).cast(),
            ).unwrap()
        };

        let env = cl.captures_ptr().unwrap();
        // SAFETY: The captures are a live i64.
        assert_eq!(unsafe { env.cast::<i64>().as_ptr().read() }, 100);

        cl.free();
    }

    #[test]
    fn shared_environments_share_one_count()
    {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        unsafe fn drop_counting(_captures: NonNull<u8>)
        {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let ops = ElemOps{
            size: std::mem::size_of::<i64>(),
            drop: Some(drop_counting),
            clone: None,
        };

        let captured = 9i64;
        // SAFETY: The source is a live i64.
        let mut first = unsafe {
            Closure::make(
                add_one as *const (),
                &ops,
                NonNull::from(&captured).cast(),
            ).unwrap()
        };
        let mut second = first.rebind(add_two as *const ());

        assert_eq!(first.env_count(), Some(2));
        assert_eq!(
            first.captures_ptr().unwrap(),
            second.captures_ptr().unwrap(),
        );
        assert_ne!(first.code(), second.code());

        first.free();
        assert_eq!(DROPS.load(Ordering::Relaxed), 0);
        second.free();
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
    }
}
