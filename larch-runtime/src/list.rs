//! The persistent list family.
//!
//! Lists are singly linked and structurally shared: many heads may hang
//! off one common tail, which is why release must walk iteratively and
//! stop at the first cell that is still referenced elsewhere. Walking
//! past a shared cell would free memory other lists still use; stopping
//! at a wholly-owned one would leak it. No operation can construct a
//! cycle, so a walk to the null tail always terminates.

use {
    crate::{
        alloc::{self, BLOCK_ALIGN},
        elem::ElemOps,
        rc::{RefCount, release_raw},
        status::{Error, Result},
    },
    std::{marker::PhantomData, ptr::{self, NonNull}},
};

// Head payload starts one aligned unit past the header, as everywhere.
const HEAD_OFFSET: usize = BLOCK_ALIGN;

/// One list cell. The head payload follows the header in the same
/// allocation; the tail is a shared reference to the next cell.
#[repr(C)]
struct Cell
{
    rc: RefCount,
    tail: *mut Cell,
}

const _: () = assert!(std::mem::size_of::<Cell>() <= HEAD_OFFSET);

/// A persistent list value; null is the empty list.
///
/// Once published a list is logically immutable: no operation rewrites
/// an existing tail link. Lists have no `Drop` impl;
/// generated code owns every release site explicitly through
/// [`free`][`Self::free`], supplying the element ops of its head type.
#[repr(transparent)]
#[derive(Debug)]
pub struct List
{
    head: *mut Cell,
}

// SAFETY: Published cells are immutable and counts are atomic.
unsafe impl Send for List { }
unsafe impl Sync for List { }

impl List
{
    /// The empty list.
    pub const fn nil() -> Self
    {
        Self{head: ptr::null_mut()}
    }

    /// Whether this is the empty list.
    pub fn is_empty(&self) -> bool
    {
        self.head.is_null()
    }

    /// Prepend one element, sharing `tail`.
    ///
    /// The head is copy-constructed through the injected ops; the tail
    /// gains one owner. A failed head copy releases the fresh cell and
    /// leaves the tail untouched.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of the shape `ops` describes.
    pub unsafe fn cons(src: NonNull<u8>, ops: &ElemOps, tail: &List)
        -> Result<Self>
    {
        let block = alloc::alloc_block(HEAD_OFFSET + ops.size)?;
        let cell = block.cast::<Cell>().as_ptr();

        if let Err(err) = ops.clone_one(src, head_of(cell)) {
            alloc::free_block(block);
            return Err(err);
        }

        if let Some(tail_cell) = NonNull::new(tail.head) {
            tail_cell.as_ref().rc.retain();
        }
        cell.write(Cell{rc: RefCount::new(1), tail: tail.head});

        Ok(Self{head: cell})
    }

    /// Copy the list: retain the head cell and alias.
    pub fn copy(&self) -> Self
    {
        if let Some(cell) = NonNull::new(self.head) {
            // SAFETY: We co-own the head cell.
            unsafe { cell.as_ref().rc.retain(); }
        }
        Self{head: self.head}
    }

    /// Release the list and null the descriptor.
    ///
    /// Walks from the head, dropping one owner per cell. A cell whose
    /// pre-decrement count was exactly 1 is destroyed (head payload
    /// first) and the walk advances to its tail; any other count means
    /// the remaining chain is still referenced elsewhere and the walk
    /// stops immediately. The walk is a loop, not recursion; chains may
    /// be arbitrarily long.
    pub fn free(&mut self, ops: &ElemOps)
    {
        let mut cell = self.head;
        while !cell.is_null() {
            // SAFETY: We own one reference to the cell.
            if unsafe { release_raw(cell.cast::<RefCount>()) } != 1 {
                break;
            }
            // SAFETY: We were the last owner; destroy head, then cell.
            unsafe {
                let tail = (*cell).tail;
                ops.drop_one(head_of(cell));
                alloc::free_block(NonNull::new_unchecked(cell).cast());
                cell = tail;
            }
        }
        self.head = ptr::null_mut();
    }

    /// The number of elements, by walking to the null tail.
    pub fn len(&self) -> usize
    {
        self.heads().count()
    }

    /// The head element, or [`NullList`][`Error::NullList`] when empty.
    pub fn head_ptr(&self) -> Result<NonNull<u8>>
    {
        match NonNull::new(self.head) {
            Some(cell) => Ok(head_of(cell.as_ptr())),
            None       => Err(Error::NullList),
        }
    }

    /// An owned copy of the tail, or
    /// [`NullList`][`Error::NullList`] when empty.
    pub fn tail(&self) -> Result<Self>
    {
        if self.head.is_null() {
            return Err(Error::NullList);
        }
        // SAFETY: The head cell is live.
        let tail = Self{head: unsafe { (*self.head).tail }};
        Ok(tail.copy())
    }

    /// Borrowing walk over the head payloads.
    pub fn heads(&self) -> Heads
    {
        Heads{cell: self.head, _list: PhantomData}
    }

    #[cfg(test)]
    fn head_count(&self) -> Option<isize>
    {
        // SAFETY: We co-own the head cell.
        unsafe { self.head.as_ref().map(|cell| cell.rc.load()) }
    }
}

/// Borrowing iterator over a list's head payload pointers.
pub struct Heads<'a>
{
    cell: *mut Cell,
    _list: PhantomData<&'a List>,
}

impl<'a> Iterator for Heads<'a>
{
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<NonNull<u8>>
    {
        let cell = NonNull::new(self.cell)?;
        // SAFETY: The borrowed list keeps the chain alive.
        self.cell = unsafe { cell.as_ref().tail };
        Some(head_of(cell.as_ptr()))
    }
}

/* -------------------------------------------------------------------------- */
/*                                 ListBuilder                                */
/* -------------------------------------------------------------------------- */

/// First/last construction of a not-yet-published list.
///
/// The builder extends the chain by linking a fresh cell after the
/// current last and advancing; that mutation is sound only because the
/// chain has not been published yet. [`finish`][`Self::finish`]
/// publishes the head, after which the list is immutable like any
/// other. An abandoned builder releases everything it built.
pub struct ListBuilder
{
    first: *mut Cell,
    last: *mut Cell,
    ops: ElemOps,
}

impl ListBuilder
{
    /// Start an empty builder for elements of the given shape.
    pub fn new(ops: ElemOps) -> Self
    {
        Self{first: ptr::null_mut(), last: ptr::null_mut(), ops}
    }

    /// Append one element at the end of the unpublished chain.
    ///
    /// # Safety
    ///
    /// `src` must hold a live element of the builder's shape.
    pub unsafe fn push(&mut self, src: NonNull<u8>) -> Result<()>
    {
        let block = alloc::alloc_block(HEAD_OFFSET + self.ops.size)?;
        let cell = block.cast::<Cell>().as_ptr();

        if let Err(err) = self.ops.clone_one(src, head_of(cell)) {
            alloc::free_block(block);
            return Err(err);
        }
        cell.write(Cell{rc: RefCount::new(1), tail: ptr::null_mut()});

        if self.last.is_null() {
            self.first = cell;
        } else {
            (*self.last).tail = cell;
        }
        self.last = cell;
        Ok(())
    }

    /// Publish the built list.
    pub fn finish(mut self) -> List
    {
        let list = List{head: self.first};
        self.first = ptr::null_mut();
        self.last = ptr::null_mut();
        list
    }
}

impl Drop for ListBuilder
{
    fn drop(&mut self)
    {
        let mut unpublished = List{head: self.first};
        unpublished.free(&self.ops);
    }
}

fn head_of(cell: *mut Cell) -> NonNull<u8>
{
    // SAFETY: Cells are allocated with HEAD_OFFSET + element size bytes.
    unsafe { NonNull::new_unchecked(cell.cast::<u8>().add(HEAD_OFFSET)) }
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    fn int_ops() -> ElemOps
    {
        ElemOps::trivial(std::mem::size_of::<i64>())
    }

    unsafe fn cons_int(value: i64, tail: &List) -> List
    {
        List::cons(NonNull::from(&value).cast(), &int_ops(), tail).unwrap()
    }

    fn to_vec(list: &List) -> Vec<i64>
    {
        list.heads()
            // SAFETY: Heads are live i64 payloads.
            .map(|head| unsafe { head.cast::<i64>().as_ptr().read() })
            .collect()
    }

    #[test]
    fn cons_shares_the_tail()
    {
        let ops = int_ops();
        // SAFETY: Sources are live i64s.
        let (mut c, mut b, mut a) = unsafe {
            let c = cons_int(30, &List::nil());
            let b = cons_int(20, &c);
            let a = cons_int(10, &b);
            (c, b, a)
        };

        assert_eq!(to_vec(&a), vec![10, 20, 30]);
        assert_eq!(a.len(), 3);
        assert_eq!(b.head_count(), Some(2));
        assert_eq!(c.head_count(), Some(2));

        a.free(&ops);
        b.free(&ops);
        c.free(&ops);
    }

    #[test]
    fn release_stops_at_the_first_shared_cell()
    {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        unsafe fn drop_counting(_head: NonNull<u8>)
        {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let ops = ElemOps{
            size: std::mem::size_of::<i64>(),
            drop: Some(drop_counting),
            clone: None,
        };

        // SAFETY: Sources are live i64s.
        let (mut c, mut b, mut a) = unsafe {
            let one = 1i64;
            let two = 2i64;
            let three = 3i64;
            let c = List::cons(NonNull::from(&three).cast(), &ops, &List::nil())
                .unwrap();
            let b = List::cons(NonNull::from(&two).cast(), &ops, &c).unwrap();
            let a = List::cons(NonNull::from(&one).cast(), &ops, &b).unwrap();
            (c, b, a)
        };

        // Keep a second handle to B, drop the construction handles.
        let mut held = b.copy();
        b.free(&ops);
        c.free(&ops);
        assert_eq!(DROPS.load(Ordering::Relaxed), 0);

        // Releasing A destroys A's payload only: B is still shared.
        a.free(&ops);
        assert_eq!(DROPS.load(Ordering::Relaxed), 1);
        assert_eq!(to_vec(&held), vec![2, 3]);
        assert_eq!(held.head_count(), Some(1));

        // B and C remain independently releasable.
        held.free(&ops);
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn free_of_the_empty_list_is_a_no_op()
    {
        let ops = int_ops();
        let mut list = List::nil();
        list.free(&ops);
        list.free(&ops);
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert_eq!(list.head_ptr().unwrap_err(), Error::NullList);
        assert_eq!(list.tail().unwrap_err(), Error::NullList);
    }

    #[test]
    fn builder_publishes_in_push_order()
    {
        let ops = int_ops();
        let mut builder = ListBuilder::new(ops);
        for value in [1i64, 2, 3, 4] {
            // SAFETY: The source is a live i64.
            unsafe {
                builder.push(NonNull::from(&value).cast()).unwrap();
            }
        }

        let mut list = builder.finish();
        assert_eq!(to_vec(&list), vec![1, 2, 3, 4]);
        list.free(&ops);
    }

    #[test]
    fn abandoned_builders_release_what_they_built()
    {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        unsafe fn drop_counting(_head: NonNull<u8>)
        {
            DROPS.fetch_add(1, Ordering::Relaxed);
        }

        let ops = ElemOps{
            size: std::mem::size_of::<i64>(),
            drop: Some(drop_counting),
            clone: None,
        };

        {
            let mut builder = ListBuilder::new(ops);
            for value in [5i64, 6] {
                // SAFETY: The source is a live i64.
                unsafe {
                    builder.push(NonNull::from(&value).cast()).unwrap();
                }
            }
        }
        assert_eq!(DROPS.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn tail_returns_an_owned_handle()
    {
        let ops = int_ops();
        // SAFETY: Sources are live i64s.
        let (mut b, mut a) = unsafe {
            let b = cons_int(2, &List::nil());
            let a = cons_int(1, &b);
            (b, a)
        };

        let mut rest = a.tail().unwrap();
        assert_eq!(to_vec(&rest), vec![2]);
        assert_eq!(b.head_count(), Some(3));

        a.free(&ops);
        rest.free(&ops);
        b.free(&ops);
    }
}
