//! The thread-local execution context.
//!
//! Each worker thread owns a pending-exception slot and a
//! pseudo-random-number state, initialized once before first use and
//! never shared or migrated across threads. Throwing parks the
//! exception value in the slot and returns its tag through the status
//! channel; whoever catches by tag claims the value back out.

use {
    crate::{exn::Exn, status::Error},
    std::cell::{Cell, RefCell},
};

thread_local!
{
    static PENDING: RefCell<Option<Exn>> = const { RefCell::new(None) };
    static RNG: Cell<u64> = const { Cell::new(seed_for(0)) };
}

/// Initialize this worker thread's context.
///
/// Clears any pending exception and derives the thread's deterministic
/// RNG state from its index. Call once per worker before first use;
/// calling again re-initializes.
pub fn init_thread(index: usize)
{
    PENDING.with(|slot| {
        if let Some(mut stale) = slot.borrow_mut().take() {
            stale.free();
        }
    });
    RNG.with(|rng| rng.set(seed_for(index)));
}

/// Park an exception in this thread's slot and return its tag as the
/// propagatable error.
///
/// A previously parked exception that nobody claimed is released first.
pub fn throw(exn: Exn) -> Error
{
    let err = exn.error();
    PENDING.with(|slot| {
        if let Some(mut dropped) = slot.borrow_mut().replace(exn) {
            dropped.free();
        }
    });
    err
}

/// Claim the pending exception for tag-matching, leaving the slot
/// empty.
pub fn take_pending() -> Option<Exn>
{
    PENDING.with(|slot| slot.borrow_mut().take())
}

/// The pending exception's tag, without claiming it.
pub fn pending_tag() -> Option<i32>
{
    PENDING.with(|slot| slot.borrow().as_ref().map(Exn::tag))
}

/// The deterministic RNG state for a worker index.
///
/// The multiply/mix recurrence is iterated `2 * index + 10` times from
/// the all-ones state, so nearby indices land on well-separated states.
pub const fn seed_for(index: usize) -> u64
{
    let mut state = u64::MAX;
    let mut round = 0;
    while round < 2 * index + 10 {
        state = mix(state);
        round += 1;
    }
    state
}

/// Advance this thread's RNG state and return it.
pub fn next_u64() -> u64
{
    RNG.with(|rng| {
        let state = mix(rng.get());
        rng.set(state);
        state
    })
}

const fn mix(state: u64) -> u64
{
    ((state as u32) as u64)
        .wrapping_mul(4_187_999_619)
        .wrapping_add(state >> 32)
}
