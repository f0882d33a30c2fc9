//! Shared runtime primitives for the notification platform.
//!
//! This crate bundles three self-contained mechanisms the platform's
//! services share:
//!
//! ## Sealed values
//!
//! Authenticated encryption of JSON payloads into opaque byte strings,
//! with ordered-key rotation and scoped decryption:
//! - [`SealedValue`]: immutable ciphertext container; plaintext only ever
//!   exists inside [`SealedValue::unsealed`]'s closure
//! - [`SealingKeySet`]: primary key encrypts, decryption tries each key
//!   in order
//! - [`AppSealer`]: keys derived from application configuration
//!
//! ## Context-local lazy resources
//!
//! - [`TaskContext`]: explicit per-task context object
//! - [`LazyLocalGetter`]: one factory invocation per context, cached
//!   until cleared, exact-type validated
//! - [`LazyLocalGetterResetter`]: bulk clearing, mostly for test isolation
//!
//! ## Adaptive connection worker
//!
//! - [`ConnectionWorker`]: accept loop over a bounded slot pool that
//!   grows one slot at a time under a cooldown, recycles task contexts
//!   across connections, and drains on shutdown
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use notify_utils::{AppConfig, AppSealer, SealedValue};
//! use serde_json::json;
//!
//! let config = AppConfig::load()?;
//! let sealer = AppSealer::from_config(&config);
//!
//! let sealed = sealer.seal(&json!({"user_id": 42, "role": "admin"}))?;
//! let role = sealer.unsealed(&sealed, |v| v["role"].clone())?;
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod local_vars;
pub mod logging;
pub mod sealed_value;
pub mod worker;

// Re-export configuration types
pub use config::AppConfig;
pub use config::ConfigError;
pub use config::SealingConfig;
pub use config::WorkerConfig;
// Re-export error types
pub use error::Result;
pub use error::UtilsError;
// Re-export context-local types
pub use local_vars::LazyLocalGetter;
pub use local_vars::LazyLocalGetterResetter;
pub use local_vars::TaskContext;
// Re-export sealed value types
pub use sealed_value::AppSealer;
pub use sealed_value::SealedValue;
pub use sealed_value::SealingKey;
pub use sealed_value::SealingKeySet;
// Re-export worker types
pub use worker::ConnectionHandler;
pub use worker::ConnectionWorker;
pub use worker::TimeoutHandler;
pub use worker::recycler::ContextRecycler;
