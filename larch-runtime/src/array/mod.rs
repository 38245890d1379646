//! The array/view family.
//!
//! An array descriptor carries up to [`MAX_DIMS`] dimensions, each a
//! `(size, byte-step)` pair, over one shared allocation. Dense, sliced,
//! and collapsed layouts differ only in their steps, so sub-views never
//! copy: they re-base the data pointer, re-derive the dimensions, and
//! retain the parent's count. The dimension array is fixed-capacity;
//! unused high dimensions are inert, not absent.

pub use self::iter::SyncIter;

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        elem::ElemOps,
        rc::{RefCount, release_raw, retain_raw},
        status::{Error, Result},
    },
    bitflags::bitflags,
    rollback::Rollback,
    std::{cell::Cell, ptr::{self, NonNull}},
};

mod iter;

/// The dimensionality cap.
pub const MAX_DIMS: usize = 5;

// Payload starts one aligned unit past the count, for every family.
const DATA_OFFSET: usize = BLOCK_ALIGN;

bitflags!
{
    /// Array descriptor flags.
    pub struct ArrFlags: u32
    {
        /// Every step exactly matches a densely packed layout.
        const CONTIGUOUS = 1;
    }
}

/// One dimension: an element count and a byte step.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Dim
{
    /// Number of elements along this dimension.
    pub size: usize,

    /// Bytes from one element to the next along this dimension.
    pub step: usize,
}

/// Per-dimension selector for [`Arr::view`].
#[derive(Clone, Copy, Debug)]
pub enum Sel
{
    /// Keep the half-open `[start, end)` slice of the dimension.
    Range(isize, isize),

    /// Keep a single index and collapse the dimension away.
    Index(isize),
}

/// A reference-counted, strided array descriptor.
///
/// The all-null descriptor is the valid freed/absent state. Arrays have
/// no `Drop` impl; generated code owns every release site explicitly
/// through [`free`][`Self::free`].
#[derive(Debug)]
pub struct Arr
{
    rc: *mut RefCount,
    elem: ElemOps,
    flags: ArrFlags,
    ndims: usize,
    data: *mut u8,
    dims: [Dim; MAX_DIMS],
}

// SAFETY: The count is atomic. Payload writes through shared
// descriptors are a caller-level data race this layer does not prevent.
unsafe impl Send for Arr { }
unsafe impl Sync for Arr { }

impl Arr
{
    /// The absent array; release is a no-op.
    pub const fn null() -> Self
    {
        Self{
            rc: ptr::null_mut(),
            elem: ElemOps::trivial(0),
            flags: ArrFlags::empty(),
            ndims: 0,
            data: ptr::null_mut(),
            dims: [Dim{size: 0, step: 0}; MAX_DIMS],
        }
    }

    /// Allocate a dense array of the given shape.
    ///
    /// With `src`, elements are copied from a densely packed source:
    /// bitwise in bulk when the ops are trivial, otherwise one at a time
    /// through the injected copy. If an element copy fails, exactly the
    /// already-copied prefix is destroyed before the failure is
    /// reported. Without `src`, the payload is zero-filled; all-zero
    /// bytes are every family's valid empty descriptor, so the result
    /// is always safe to release.
    ///
    /// # Safety
    ///
    /// A provided `src` must hold the flattened element count in the
    /// packed layout of the requested shape.
    pub unsafe fn make(
        shape: &[usize],
        elem: ElemOps,
        src: Option<NonNull<u8>>,
    ) -> Result<Self>
    {
        if shape.is_empty() || shape.len() > MAX_DIMS {
            return Err(Error::Dim);
        }

        let mut total = 1usize;
        for &size in shape {
            total = total.checked_mul(size).ok_or(Error::Size)?;
        }
        let payload = total.checked_mul(elem.size).ok_or(Error::Size)?;
        let bytes = payload.checked_add(DATA_OFFSET).ok_or(Error::Size)?;

        // INVARIANT: The innermost step is the element size.
        let mut dims = [Dim::default(); MAX_DIMS];
        let mut step = elem.size;
        for (dim, &size) in dims.iter_mut().zip(shape).rev() {
            *dim = Dim{size, step};
            step *= size;
        }

        let block = match (src, elem.clone) {
            (None, _) => alloc::alloc_block_zeroed(bytes)?,

            (Some(src), None) => {
                let block = alloc::alloc_block(bytes)?;
                ptr::copy_nonoverlapping(
                    src.as_ptr(), block.as_ptr().add(DATA_OFFSET), payload);
                block
            },

            (Some(src), Some(_)) => {
                let block = alloc::alloc_block_zeroed(bytes)?;
                let data = block.as_ptr().add(DATA_OFFSET);

                // On a failed copy, destroy exactly the elements built
                // so far, then the block, before reporting.
                let built = Cell::new(0usize);
                let guard = Rollback::new(|| {
                    // SAFETY: Exactly the first `built` elements are live.
                    unsafe {
                        for i in 0 .. built.get() {
                            elem.drop_one(nonnull_at(data, i * elem.size));
                        }
                        alloc::free_block(block);
                    }
                });

                for i in 0 .. total {
                    let offset = i * elem.size;
                    elem.clone_one(
                        nonnull_at(src.as_ptr(), offset),
                        nonnull_at(data, offset),
                    )?;
                    built.set(built.get() + 1);
                }

                guard.disarm();
                block
            },
        };

        let rc = block.cast::<RefCount>();
        rc.as_ptr().write(RefCount::new(1));

        Ok(Self{
            rc: rc.as_ptr(),
            elem,
            flags: ArrFlags::CONTIGUOUS,
            ndims: shape.len(),
            data: block.as_ptr().add(DATA_OFFSET),
            dims,
        })
    }

    /// Copy the array: retain and alias the shared allocation.
    pub fn copy(&self) -> Self
    {
        // SAFETY: A null count is a defined no-op.
        unsafe { retain_raw(self.rc); }
        Self{..*self}
    }

    /// Release the array and null the descriptor.
    ///
    /// On the last reference, elements with a non-trivial destructor are
    /// destroyed in index order (through this descriptor's dimensions)
    /// before the allocation is released; trivial elements skip that
    /// pass entirely. Safe on the null descriptor.
    pub fn free(&mut self)
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        if unsafe { release_raw(self.rc) } == 1 {
            let elem = self.elem;
            if elem.drop.is_some() {
                walk_rows(self.data, self.active_dims(), |row, n, step| {
                    for k in 0 .. n {
                        // SAFETY: Every element is live at release time.
                        unsafe { elem.drop_one(nonnull_at(row, k * step)); }
                    }
                });
            }
            // SAFETY: We were the last owner.
            unsafe { alloc::free_block(NonNull::new_unchecked(self.rc).cast()); }
        }
        *self = Self::null();
    }

    /// Slice or collapse each dimension, sharing the allocation.
    ///
    /// Out-of-range selectors fail with
    /// [`OutOfRange`][`Error::OutOfRange`]; nothing is ever clamped.
    /// Collapsing every dimension yields a single-element,
    /// 1-dimensional view. The contiguity flag is re-derived and set
    /// only when the resulting steps are provably packed.
    pub fn view(&self, sels: &[Sel]) -> Result<Self>
    {
        if self.ndims == 0 {
            return Err(Error::NullPtr);
        }
        if sels.len() != self.ndims {
            return Err(Error::Dim);
        }

        let mut offset = 0usize;
        let mut dims = [Dim::default(); MAX_DIMS];
        let mut ndims = 0;
        for (dim, sel) in self.active_dims().iter().zip(sels) {
            match *sel {
                Sel::Range(start, end) => {
                    if start < 0 || start > end || end as usize > dim.size {
                        return Err(Error::OutOfRange);
                    }
                    offset += start as usize * dim.step;
                    dims[ndims] = Dim{
                        size: (end - start) as usize,
                        step: dim.step,
                    };
                    ndims += 1;
                },
                Sel::Index(index) => {
                    if index < 0 || index as usize >= dim.size {
                        return Err(Error::OutOfRange);
                    }
                    offset += index as usize * dim.step;
                },
            }
        }
        if ndims == 0 {
            dims[0] = Dim{size: 1, step: self.elem.size};
            ndims = 1;
        }

        let mut flags = ArrFlags::empty();
        if is_packed(&dims[.. ndims], self.elem.size) {
            flags |= ArrFlags::CONTIGUOUS;
        }

        // SAFETY: A null count is a defined no-op.
        unsafe { retain_raw(self.rc); }
        Ok(Self{
            rc: self.rc,
            elem: self.elem,
            flags,
            ndims,
            data: self.data.wrapping_add(offset),
            dims,
        })
    }

    /// Deep-copy into a fresh dense array of the same shape.
    pub fn copy_data(&self) -> Result<Self>
    {
        if self.ndims == 0 {
            return Err(Error::NullPtr);
        }

        let mut shape = [0usize; MAX_DIMS];
        for (size, dim) in shape.iter_mut().zip(self.active_dims()) {
            *size = dim.size;
        }
        // SAFETY: No source; the payload starts zero-filled.
        let dst = unsafe {
            Self::make(&shape[.. self.ndims], self.elem, None)?
        };

        let elem = self.elem;
        let built = Cell::new(0usize);
        let failed = Cell::new(None);
        walk_rows(self.data, self.active_dims(), |row, n, step| {
            if failed.get().is_some() {
                return;
            }
            for k in 0 .. n {
                let src = nonnull_at(row, k * step);
                let to = nonnull_at(dst.data, built.get() * elem.size);
                // SAFETY: Source elements are live; dst is in bounds.
                let copied = unsafe { elem.clone_one(src, to) };
                match copied {
                    Ok(()) => built.set(built.get() + 1),
                    Err(err) => {
                        failed.set(Some(err));
                        return;
                    },
                }
            }
        });

        if let Some(err) = failed.get() {
            // Destroy exactly the copied prefix; the untouched suffix is
            // still all-zero and must not see the destructor twice.
            for i in 0 .. built.get() {
                // SAFETY: Exactly the first `built` elements are live.
                unsafe { elem.drop_one(nonnull_at(dst.data, i * elem.size)); }
            }
            // SAFETY: dst is unaliased; free its block without a walk.
            unsafe {
                alloc::free_block(NonNull::new_unchecked(dst.rc).cast());
            }
            return Err(err);
        }

        Ok(dst)
    }

    /// The number of active dimensions.
    pub fn ndims(&self) -> usize
    {
        self.ndims
    }

    /// The active dimensions.
    pub fn shape(&self) -> &[Dim]
    {
        self.active_dims()
    }

    /// The element count along dimension `d`.
    pub fn size(&self, d: usize) -> usize
    {
        self.dims[d].size
    }

    /// The flattened element count.
    pub fn total(&self) -> usize
    {
        self.active_dims().iter().map(|d| d.size).product()
    }

    /// Whether the steps exactly match a densely packed layout.
    pub fn is_contiguous(&self) -> bool
    {
        self.flags.contains(ArrFlags::CONTIGUOUS)
    }

    /// The injected element ops.
    pub fn elem_ops(&self) -> &ElemOps
    {
        &self.elem
    }

    /// Checked address of the element at a full multi-index.
    pub fn ptr_at(&self, index: &[usize]) -> Result<NonNull<u8>>
    {
        if index.len() != self.ndims {
            return Err(Error::Dim);
        }
        let mut offset = 0usize;
        for (&i, dim) in index.iter().zip(self.active_dims()) {
            if i >= dim.size {
                return Err(Error::OutOfRange);
            }
            offset += i * dim.step;
        }
        NonNull::new(self.data.wrapping_add(offset)).ok_or(Error::NullPtr)
    }

    fn active_dims(&self) -> &[Dim]
    {
        &self.dims[.. self.ndims]
    }

    #[cfg(test)]
    fn count(&self) -> Option<isize>
    {
        // SAFETY: A non-null count heads a live allocation we co-own.
        unsafe { self.rc.as_ref().map(RefCount::load) }
    }
}

/// Whether `dims` describe a densely packed layout for this element size.
fn is_packed(dims: &[Dim], elem_size: usize) -> bool
{
    if dims.iter().any(|dim| dim.size == 0) {
        return true;
    }
    let mut expect = elem_size;
    for dim in dims.iter().rev() {
        if dim.step != expect {
            return false;
        }
        expect *= dim.size;
    }
    true
}

/// Call `f(row, count, step)` for every innermost row, in index order.
fn walk_rows(
    data: *mut u8,
    dims: &[Dim],
    mut f: impl FnMut(*mut u8, usize, usize),
)
{
    if dims.iter().any(|dim| dim.size == 0) {
        return;
    }

    let (outer, last) = dims.split_at(dims.len() - 1);
    let last = last[0];
    let mut counters = [0usize; MAX_DIMS];
    let mut row = data;
    loop {
        f(row, last.size, last.step);

        let mut d = outer.len();
        loop {
            if d == 0 {
                return;
            }
            d -= 1;
            counters[d] += 1;
            row = row.wrapping_add(outer[d].step);
            if counters[d] < outer[d].size {
                break;
            }
            counters[d] = 0;
            row = row.wrapping_sub(outer[d].size * outer[d].step);
        }
    }
}

fn nonnull_at(base: *mut u8, offset: usize) -> NonNull<u8>
{
    // SAFETY: base is a live payload pointer; offset stays in bounds.
    unsafe { NonNull::new_unchecked(base.add(offset)) }
}
