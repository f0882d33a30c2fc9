//! Recycling of per-task contexts across connections.
//!
//! The worker discards its handler tasks after each connection, so
//! without recycling every connection would rebuild its context-local
//! resources from scratch. The recycler keeps finished contexts on a
//! stack for reuse; at steady state there are never more contexts than
//! the maximum number of concurrently-handled connections seen so far.
//!
//! Contexts are checked in as-is: leftover state from one task is visible
//! to whichever unrelated task checks the context out next. Tasks caching
//! material that must not cross that boundary clear it themselves via
//! [`TaskContext::clear`].

use std::sync::Mutex;

use crate::local_vars::TaskContext;

/// LIFO free-list of reusable [`TaskContext`] objects.
pub struct ContextRecycler {
    pool: Mutex<Vec<TaskContext>>,
}

impl ContextRecycler {
    /// Create an empty recycler.
    pub fn new() -> Self {
        Self {
            pool: Mutex::new(Vec::new()),
        }
    }

    /// Take a context for a new task, reusing the most recently returned
    /// one if any, otherwise allocating fresh.
    pub fn checkout(&self) -> TaskContext {
        self.pool
            .lock()
            .ok()
            .and_then(|mut pool| pool.pop())
            .unwrap_or_default()
    }

    /// Return a finished task's context for reuse.
    ///
    /// The context is stored as-is, possibly still populated.
    pub fn checkin(&self, ctx: TaskContext) {
        if let Ok(mut pool) = self.pool.lock() {
            pool.push(ctx);
        }
    }

    /// Number of contexts currently idle on the free-list.
    pub fn idle(&self) -> usize {
        self.pool.lock().map(|pool| pool.len()).unwrap_or(0)
    }
}

impl Default for ContextRecycler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local_vars::LazyLocalGetter;

    #[test]
    fn test_checkout_from_empty_allocates_fresh() {
        let recycler = ContextRecycler::new();
        assert_eq!(recycler.idle(), 0);

        let ctx = recycler.checkout();
        assert!(ctx.is_empty());
        assert_eq!(recycler.idle(), 0);
    }

    #[test]
    fn test_checkin_then_checkout_reuses_lifo() {
        let recycler = ContextRecycler::new();
        let getter = LazyLocalGetter::new(|| 7_u32);

        let first = recycler.checkout();
        getter.get(&first).unwrap();
        recycler.checkin(first);
        assert_eq!(recycler.idle(), 1);

        // The recycled context comes back populated: the cached resource
        // survives into the next task, which is the point.
        let reused = recycler.checkout();
        assert!(!reused.is_empty());
        assert_eq!(recycler.idle(), 0);
    }

    #[test]
    fn test_lifo_order() {
        let recycler = ContextRecycler::new();
        let getter = LazyLocalGetter::new(|| 1_u8);

        let a = recycler.checkout();
        let b = recycler.checkout();
        getter.get(&b).unwrap();

        recycler.checkin(a); // empty, below
        recycler.checkin(b); // populated, on top

        let top = recycler.checkout();
        assert!(!top.is_empty());
        let bottom = recycler.checkout();
        assert!(bottom.is_empty());
    }

    #[test]
    fn test_cleared_context_recycles_empty() {
        let recycler = ContextRecycler::new();
        let getter = LazyLocalGetter::new(|| String::from("secret"));

        let ctx = recycler.checkout();
        getter.get(&ctx).unwrap();
        // A task that cached sensitive material clears before release
        ctx.clear();
        recycler.checkin(ctx);

        assert!(recycler.checkout().is_empty());
    }
}
