//! Synchronized iteration over arrays of identical shape.
//!
//! Elementwise operations emitted by the compiler walk several arrays in
//! lockstep. Rather than paying a per-element address computation in
//! every dimension, the iterator finds the largest trailing block of
//! dimensions whose steps match a packed layout in *every* array and
//! hands out one pointer per array per block. In the common dense case
//! that is a single block covering the whole payload; sliced layouts
//! fall back to smaller blocks with an odometer carry over the slower
//! dimensions, still O(1) amortized per block.

use {
    super::{Arr, MAX_DIMS},
    crate::status::{Error, Result},
    smallvec::SmallVec,
    std::marker::PhantomData,
};

/// Lockstep block iterator over arrays of identical shape.
#[derive(Debug)]
pub struct SyncIter<'a>
{
    /// Current block pointer per array.
    ptrs: SmallVec<[*mut u8; 4]>,

    /// Per array, the steps of the iterated (slow) dimensions.
    steps: SmallVec<[[usize; MAX_DIMS]; 4]>,

    /// Sizes of the iterated dimensions, shared by all arrays.
    sizes: [usize; MAX_DIMS],

    /// Odometer position over the iterated dimensions.
    counters: [usize; MAX_DIMS],

    /// How many leading dimensions are iterated; the rest form blocks.
    depth: usize,

    /// Elements per block.
    blocksize: usize,

    /// Total number of blocks.
    nblocks: usize,

    /// Blocks handed out so far.
    idx: usize,

    /// The blocks point into the arrays' payloads.
    _arrays: PhantomData<&'a Arr>,
}

impl<'a> SyncIter<'a>
{
    /// Begin iterating `arrs` in lockstep.
    ///
    /// All arrays must have the same shape
    /// ([`SizeMismatch`][`Error::SizeMismatch`] otherwise); element
    /// sizes may differ per array.
    pub fn begin(arrs: &[&'a Arr]) -> Result<Self>
    {
        let Some(first) = arrs.first()
            else { return Err(Error::Dim) };
        if first.ndims == 0 {
            return Err(Error::NullPtr);
        }

        let ndims = first.ndims;
        for arr in &arrs[1 ..] {
            if arr.ndims != ndims {
                return Err(Error::SizeMismatch);
            }
            for d in 0 .. ndims {
                if arr.dims[d].size != first.dims[d].size {
                    return Err(Error::SizeMismatch);
                }
            }
        }

        // Grow the trailing block while every array stays packed.
        let mut depth = ndims;
        let mut expect: SmallVec<[usize; 4]> =
            arrs.iter().map(|arr| arr.elem.size).collect();
        while depth > 0 {
            let d = depth - 1;
            let packed = arrs.iter().zip(&expect)
                .all(|(arr, &e)| arr.dims[d].step == e);
            if !packed {
                break;
            }
            for e in expect.iter_mut() {
                *e *= first.dims[d].size;
            }
            depth -= 1;
        }

        let blocksize = first.dims[depth .. ndims].iter()
            .map(|dim| dim.size)
            .product::<usize>();
        let mut nblocks = first.dims[.. depth].iter()
            .map(|dim| dim.size)
            .product::<usize>();
        if blocksize == 0 {
            nblocks = 0;
        }

        let mut sizes = [0usize; MAX_DIMS];
        for d in 0 .. depth {
            sizes[d] = first.dims[d].size;
        }

        let steps = arrs.iter()
            .map(|arr| {
                let mut steps = [0usize; MAX_DIMS];
                for d in 0 .. depth {
                    steps[d] = arr.dims[d].step;
                }
                steps
            })
            .collect();

        Ok(Self{
            ptrs: arrs.iter().map(|arr| arr.data).collect(),
            steps,
            sizes,
            counters: [0; MAX_DIMS],
            depth,
            blocksize,
            nblocks,
            idx: 0,
            _arrays: PhantomData,
        })
    }

    /// Elements per block.
    pub fn blocksize(&self) -> usize
    {
        self.blocksize
    }

    /// Total number of blocks.
    pub fn nblocks(&self) -> usize
    {
        self.nblocks
    }

    /// The next block's pointer per array, or [`None`] when exhausted.
    ///
    /// Each pointer addresses [`blocksize`][`Self::blocksize`]
    /// consecutive elements of that array.
    pub fn next_block(&mut self) -> Option<&[*mut u8]>
    {
        if self.idx >= self.nblocks {
            return None;
        }

        if self.idx > 0 {
            // Odometer carry; cannot run off the front while blocks
            // remain.
            let mut d = self.depth;
            loop {
                d -= 1;
                self.counters[d] += 1;
                for (ptr, steps) in self.ptrs.iter_mut().zip(&self.steps) {
                    *ptr = ptr.wrapping_add(steps[d]);
                }
                if self.counters[d] < self.sizes[d] {
                    break;
                }
                self.counters[d] = 0;
                for (ptr, steps) in self.ptrs.iter_mut().zip(&self.steps) {
                    *ptr = ptr.wrapping_sub(self.sizes[d] * steps[d]);
                }
            }
        }

        self.idx += 1;
        Some(&self.ptrs)
    }
}
