//! Lazily-constructed context-local resources.
//!
//! A [`TaskContext`] is an explicit per-task context object: each
//! concurrently-scheduled task owns exactly one, and resources cached in
//! it are invisible to every other task. A [`LazyLocalGetter`] populates
//! one slot of a context on first access from a zero-argument factory and
//! serves the cached value thereafter, until the slot is cleared.
//!
//! [`LazyLocalGetterResetter`] holds a list of getters and clears them all
//! in one call. In reality this is only ever used for resetting between
//! tests.

use std::any::Any;
use std::any::TypeId;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::error::FactoryTypeMismatchSnafu;
use crate::error::Result;

type AnyValue = Arc<dyn Any + Send + Sync>;
type DynFactory = Arc<dyn Fn() -> AnyValue + Send + Sync>;

/// Process-wide slot id allocator. Two getters never share a slot, so a
/// context can host any number of them without collision.
static NEXT_SLOT_ID: AtomicU64 = AtomicU64::new(0);

/// Per-task storage for context-local resources.
///
/// Owned by at most one active task at a time; the mutex exists so the
/// type can be moved across task spawns, not for cross-task sharing.
pub struct TaskContext {
    slots: Mutex<HashMap<u64, AnyValue>>,
}

impl TaskContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// True if no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().map(|s| s.is_empty()).unwrap_or(true)
    }

    /// Drop every populated slot.
    ///
    /// Tasks that cache sensitive material should call this before their
    /// context is recycled for reuse by an unrelated task.
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }

    fn get_slot(&self, id: u64) -> Option<AnyValue> {
        self.slots.lock().ok()?.get(&id).cloned()
    }

    fn set_slot(&self, id: u64, value: AnyValue) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.insert(id, value);
        }
    }

    fn clear_slot(&self, id: u64) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.remove(&id);
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let populated = self.slots.lock().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("TaskContext").field("populated_slots", &populated).finish()
    }
}

/// Wrapper for a lazily-constructed context-local resource of type `T`.
///
/// `get` runs the factory at most once per context between clears and
/// validates that the factory produced exactly a `T`. The typed
/// constructor cannot produce a mismatch; the check carries weight for
/// factories supplied as type-erased callables via [`Self::from_dyn_factory`].
pub struct LazyLocalGetter<T: Any + Send + Sync> {
    slot_id: u64,
    factory: DynFactory,
    expected: TypeId,
    expected_name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> LazyLocalGetter<T> {
    /// Create a getter around a zero-argument factory.
    pub fn new(factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self::from_dyn_factory(Arc::new(move || Arc::new(factory()) as AnyValue))
    }

    /// Create a getter around a type-erased factory.
    ///
    /// The factory's output is checked against `T` on every construction;
    /// a value of any other concrete type fails the `get` that triggered it.
    pub fn from_dyn_factory(factory: DynFactory) -> Self {
        Self {
            slot_id: NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed),
            factory,
            expected: TypeId::of::<T>(),
            expected_name: std::any::type_name::<T>(),
            _marker: PhantomData,
        }
    }

    /// Return the context's cached value, constructing it on first access.
    pub fn get(&self, ctx: &TaskContext) -> Result<Arc<T>> {
        if let Some(cached) = ctx.get_slot(self.slot_id) {
            return cached
                .downcast::<T>()
                .map_err(|_| FactoryTypeMismatchSnafu { expected: self.expected_name }.build());
        }

        let value = (self.factory)();
        if (*value).type_id() != self.expected {
            return FactoryTypeMismatchSnafu { expected: self.expected_name }.fail();
        }
        ctx.set_slot(self.slot_id, value.clone());

        value
            .downcast::<T>()
            .map_err(|_| FactoryTypeMismatchSnafu { expected: self.expected_name }.build())
    }

    /// Empty the context's slot. The next `get` re-runs the factory.
    pub fn clear(&self, ctx: &TaskContext) {
        ctx.clear_slot(self.slot_id);
    }
}

/// Object-safe clearing seam so a resetter can hold getters of mixed types.
pub trait ClearLocal: Send + Sync {
    /// Empty this getter's slot in the given context.
    fn clear_local(&self, ctx: &TaskContext);
}

impl<T: Any + Send + Sync> ClearLocal for LazyLocalGetter<T> {
    fn clear_local(&self, ctx: &TaskContext) {
        self.clear(ctx);
    }
}

/// Holds registered getters and resets them all in a single call.
pub struct LazyLocalGetterResetter {
    getters: Mutex<Vec<Arc<dyn ClearLocal>>>,
}

impl LazyLocalGetterResetter {
    /// Create an empty resetter.
    pub fn new() -> Self {
        Self {
            getters: Mutex::new(Vec::new()),
        }
    }

    /// Add a getter to the managed set.
    ///
    /// Registering the same getter twice is harmless; it is cleared twice.
    pub fn register(&self, getter: Arc<dyn ClearLocal>) {
        if let Ok(mut getters) = self.getters.lock() {
            getters.push(getter);
        }
    }

    /// Clear every registered getter's slot, in registration order.
    pub fn reset_all(&self, ctx: &TaskContext) {
        if let Ok(getters) = self.getters.lock() {
            for getter in getters.iter() {
                getter.clear_local(ctx);
            }
        }
    }
}

impl Default for LazyLocalGetterResetter {
    fn default() -> Self {
        Self::new()
    }
}
