//! Pure pool expansion policy functions.
//!
//! All functions are deterministic and side-effect free; time is passed
//! explicitly as elapsed milliseconds. The accept loop feeds these with
//! live values, the tests feed them simulated timelines.

/// What the accept loop should do before accepting the next connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptGate {
    /// Accept immediately; the cooldown has fully elapsed and the pool is
    /// below its ceiling.
    Proceed,
    /// Wait for a slot to free up before accepting.
    WaitForSlot {
        /// Give up waiting after this many milliseconds and accept anyway.
        /// `None` means wait indefinitely (the pool is at its ceiling and
        /// can only admit work as slots free).
        timeout_ms: Option<u64>,
    },
}

/// Time to wait before the next accept, in milliseconds.
///
/// The cooldown remainder, floored at `min_wait_ms`. A zero result means
/// proceed immediately. The wait biases new connections toward workers
/// that already have free capacity instead of reflexively growing every
/// pool.
#[inline]
pub fn accept_wait_ms(min_wait_ms: u64, cooldown_ms: u64, since_last_expansion_ms: u64) -> u64 {
    min_wait_ms.max(cooldown_ms.saturating_sub(since_last_expansion_ms))
}

/// Decide the gate for the next accept.
#[inline]
pub fn accept_gate(pool_size: usize, max_size: usize, wait_ms: u64) -> AcceptGate {
    if pool_size >= max_size {
        AcceptGate::WaitForSlot { timeout_ms: None }
    } else if wait_ms > 0 {
        AcceptGate::WaitForSlot { timeout_ms: Some(wait_ms) }
    } else {
        AcceptGate::Proceed
    }
}

/// Whether the pool should grow by one slot after accepting a connection.
///
/// Expansion happens only when every slot is occupied and the ceiling has
/// not been reached; growth is always by exactly one.
#[inline]
pub fn should_expand(pool_size: usize, max_size: usize, free_slots: usize) -> bool {
    free_slots == 0 && pool_size < max_size
}
